//! Statement and control-flow lowering: blocks, `return`, `if`/`elif`
//! chains with PHI merging, `while`, and `match` over tagged unions.

use inkwell::basic_block::BasicBlock;
use inkwell::values::{BasicValue, IntValue};

use crate::ast::{Expr, Loc, Pattern};
use crate::compiler::helpers::undef_of;
use crate::compiler::{Compiler, TypedValue, Variable};
use crate::types::Ty;

impl<'ctx> Compiler<'ctx> {
    /// A block enters a new scope, lowers its statements in order, and
    /// yields the last statement's value. Lowering stops early once a
    /// terminator has been emitted (code after `return` is unreachable).
    pub(crate) fn lower_block(&mut self, stmts: &[Expr]) -> Option<TypedValue<'ctx>> {
        self.enter_new_scope();
        let mut last = None;
        for stmt in stmts {
            if self.block_terminated() {
                break;
            }
            last = self.lower_expr(stmt);
        }
        self.exit_scope();
        match last {
            Some(v) => Some(v),
            None if stmts.is_empty() => Some(self.void_literal()),
            None => None,
        }
    }

    /// `return e` releases the function's freeable locals, emits the
    /// terminator, and reports the operand's typed value so callers (and
    /// return-type inference) can see it. Callers inside `while`/`match`
    /// arms check the block terminator before adding successor branches.
    pub(crate) fn lower_ret(&mut self, expr: &Expr, _loc: Loc) -> Option<TypedValue<'ctx>> {
        let val = self.lower_expr(expr)?;
        self.release_function_locals();
        if val.ty == Ty::Unit {
            self.builder.build_return(None).ok()?;
        } else {
            self.builder.build_return(Some(&val.val)).ok()?;
        }
        Some(val)
    }

    /// Recursive lowering of `if`/`elif`/`else` chains. Every arm compiles
    /// into its own block; arms that do not end in a terminator contribute
    /// their value to the PHI at the merge block. A missing `else` makes
    /// the whole expression unit-typed.
    pub(crate) fn lower_if(
        &mut self,
        cond: &Expr,
        then: &Expr,
        els: Option<&Expr>,
    ) -> Option<TypedValue<'ctx>> {
        let f = self.builder.get_insert_block()?.get_parent()?;
        let merge_bb = self.context.append_basic_block(f, "endif");
        let mut branches: Vec<(TypedValue<'ctx>, BasicBlock<'ctx>)> = Vec::new();
        self.comp_if(cond, then, els, merge_bb, &mut branches)
    }

    fn comp_if(
        &mut self,
        cond: &Expr,
        then: &Expr,
        els: Option<&Expr>,
        merge_bb: BasicBlock<'ctx>,
        branches: &mut Vec<(TypedValue<'ctx>, BasicBlock<'ctx>)>,
    ) -> Option<TypedValue<'ctx>> {
        let cond_val = self.lower_expr(cond)?;
        if !cond_val.val.is_int_value() {
            return self.comp_err(
                format!("if condition must be a bool, got a value of type {}", cond_val.ty),
                cond.loc(),
            );
        }
        let f = self.builder.get_insert_block()?.get_parent()?;
        let then_bb = self.context.append_basic_block(f, "then");

        match els {
            Some(Expr::If {
                cond: elif_cond,
                then: elif_then,
                els: elif_els,
                ..
            }) => {
                let else_bb = self.context.append_basic_block(f, "else");
                self.builder
                    .build_conditional_branch(cond_val.val.into_int_value(), then_bb, else_bb)
                    .ok()?;

                self.builder.position_at_end(then_bb);
                let then_val = self.lower_expr(then)?;
                if !self.block_terminated() {
                    let cur = self.builder.get_insert_block()?;
                    self.builder.build_unconditional_branch(merge_bb).ok()?;
                    branches.push((then_val, cur));
                }

                self.builder.position_at_end(else_bb);
                self.comp_if(elif_cond, elif_then, elif_els.as_deref(), merge_bb, branches)
            }
            Some(els) => {
                let else_bb = self.context.append_basic_block(f, "else");
                self.builder
                    .build_conditional_branch(cond_val.val.into_int_value(), then_bb, else_bb)
                    .ok()?;

                self.builder.position_at_end(then_bb);
                let then_val = self.lower_expr(then)?;
                let then_term = self.block_terminated();
                if !then_term {
                    let cur = self.builder.get_insert_block()?;
                    self.builder.build_unconditional_branch(merge_bb).ok()?;
                    branches.push((then_val.clone(), cur));
                }

                self.builder.position_at_end(else_bb);
                let else_val = self.lower_expr(els)?;
                let else_term = self.block_terminated();
                if !else_term {
                    let cur = self.builder.get_insert_block()?;
                    self.builder.build_unconditional_branch(merge_bb).ok()?;
                    branches.push((else_val.clone(), cur));
                }

                // Arms of differing type are only an error when both still
                // flow into the merge block.
                if then_val.ty != else_val.ty && !then_term && !else_term {
                    return self.comp_err(
                        format!(
                            "if expression's then branch type {} does not match the else branch type {}",
                            then_val.ty, else_val.ty
                        ),
                        then.loc(),
                    );
                }

                self.builder.position_at_end(merge_bb);
                if branches.is_empty() {
                    // Every arm returned.
                    self.builder.build_unreachable().ok()?;
                    return Some(self.void_literal());
                }
                let first_ty = branches[0].0.ty.clone();
                if first_ty == Ty::Unit {
                    return Some(self.void_literal());
                }
                let phi = self
                    .builder
                    .build_phi(branches[0].0.val.get_type(), "ifphi")
                    .ok()?;
                for (val, bb) in branches.iter() {
                    phi.add_incoming(&[(&val.val, *bb)]);
                }
                Some(TypedValue::new(phi.as_basic_value(), first_ty))
            }
            None => {
                self.builder
                    .build_conditional_branch(cond_val.val.into_int_value(), then_bb, merge_bb)
                    .ok()?;
                self.builder.position_at_end(then_bb);
                let _ = self.lower_expr(then)?;
                self.branch_unless_terminated(merge_bb);
                self.builder.position_at_end(merge_bb);
                Some(self.void_literal())
            }
        }
    }

    /// `while` emits cond/body/end blocks with an unconditional back-edge
    /// from the body to the condition; the expression value is unit.
    pub(crate) fn lower_while(&mut self, cond: &Expr, body: &Expr) -> Option<TypedValue<'ctx>> {
        let f = self.builder.get_insert_block()?.get_parent()?;
        let cond_bb = self.context.append_basic_block(f, "while_cond");
        let body_bb = self.context.append_basic_block(f, "while");
        let end_bb = self.context.append_basic_block(f, "end_while");

        self.builder.build_unconditional_branch(cond_bb).ok()?;
        self.builder.position_at_end(cond_bb);
        let cond_val = self.lower_expr(cond)?;
        if !cond_val.val.is_int_value() {
            return self.comp_err(
                format!(
                    "while condition must be a bool, got a value of type {}",
                    cond_val.ty
                ),
                cond.loc(),
            );
        }
        self.builder
            .build_conditional_branch(cond_val.val.into_int_value(), body_bb, end_bb)
            .ok()?;

        self.builder.position_at_end(body_bb);
        let _ = self.lower_expr(body)?;
        self.branch_unless_terminated(cond_bb);

        self.builder.position_at_end(end_bb);
        Some(self.void_literal())
    }

    /// `match` requires a tagged-union (or tuple-shaped) scrutinee. The
    /// discriminant is field 0 of the union storage (or the whole value
    /// for payloadless unions); a switch dispatches to per-branch blocks,
    /// whose results merge through a PHI at the end block.
    pub(crate) fn lower_match(
        &mut self,
        scrutinee: &Expr,
        arms: &[(Pattern, Expr)],
        loc: Loc,
    ) -> Option<TypedValue<'ctx>> {
        let lval = self.lower_expr(scrutinee)?;
        let union_name = match &lval.ty {
            Ty::Union(n) => Some(n.clone()),
            Ty::Tuple(_) => None,
            other => {
                return self.comp_err(
                    format!(
                        "cannot match expression of type {}; match expressions need a tagged union",
                        other
                    ),
                    scrutinee.loc(),
                )
            }
        };

        // The tag always sits at index 0, except for payloadless unions
        // whose storage is the bare tag byte.
        let raw_tag = if lval.val.is_struct_value() {
            self.builder
                .build_extract_value(lval.val.into_struct_value(), 0, "tag")
                .ok()?
        } else {
            lval.val
        };
        if !raw_tag.is_int_value() {
            return self.comp_err(
                format!("cannot match on a value of type {}", lval.ty),
                scrutinee.loc(),
            );
        }
        let switch_val: IntValue<'ctx> = raw_tag.into_int_value();

        let f = self.builder.get_insert_block()?.get_parent()?;
        let match_bb = self.builder.get_insert_block()?;
        let end_bb = self.context.append_basic_block(f, "end_match");

        let mut cases: Vec<(IntValue<'ctx>, BasicBlock<'ctx>)> = Vec::new();
        let mut default_bb: Option<BasicBlock<'ctx>> = None;
        // (incoming block, arm value, arm ended in a terminator)
        let mut merges: Vec<(BasicBlock<'ctx>, Option<TypedValue<'ctx>>, bool)> = Vec::new();

        for (pattern, body) in arms {
            let br_bb = self.context.append_basic_block(f, "br");
            self.builder.position_at_end(br_bb);

            match pattern {
                Pattern::TagBind(tag_name, binder) => {
                    let ci = self.match_tag_const(tag_name, union_name.as_deref(), loc)?;
                    self.bind_payload(&lval, tag_name, binder, loc)?;
                    cases.push((ci, br_bb));
                }
                Pattern::Tag(tag_name) => {
                    let ci = self.match_tag_const(tag_name, union_name.as_deref(), loc)?;
                    cases.push((ci, br_bb));
                }
                Pattern::Wildcard(name) => {
                    default_bb = Some(br_bb);
                    self.sto_var(
                        name,
                        Variable {
                            tval: lval.clone(),
                            scope: self.scope,
                            no_free: true,
                        },
                    );
                }
            }

            let arm_val = self.lower_expr(body);
            let terminated = self.block_terminated();
            let incoming = self.builder.get_insert_block()?;
            if !terminated {
                self.builder.build_unconditional_branch(end_bb).ok()?;
            }
            merges.push((incoming, arm_val, terminated));
        }

        // The switch seals the block the scrutinee was lowered in.
        self.builder.position_at_end(match_bb);
        let default = default_bb.unwrap_or(end_bb);
        self.builder.build_switch(switch_val, default, &cases).ok()?;

        self.builder.position_at_end(end_bb);

        let first = match merges.first() {
            Some((_, Some(v), _)) => v.clone(),
            _ => return None,
        };
        if first.ty == Ty::Unit {
            return Some(self.void_literal());
        }

        let phi = self
            .builder
            .build_phi(first.val.get_type(), "matchphi")
            .ok()?;
        for (bb, val, terminated) in &merges {
            if let (Some(v), false) = (val, *terminated) {
                phi.add_incoming(&[(&v.val, *bb)]);
            }
        }
        // When no arm is the default, the switch itself can fall through to
        // the end block; an undef incoming keeps the PHI well-formed.
        if default_bb.is_none() {
            let undef = undef_of(first.val.get_type());
            phi.add_incoming(&[(&undef, match_bb)]);
        }
        Some(TypedValue::new(phi.as_basic_value(), first.ty))
    }

    /// Resolves a pattern's tag name to its discriminant constant, checking
    /// that the tag exists, is a union tag, and belongs to the scrutinee's
    /// union.
    fn match_tag_const(
        &mut self,
        tag_name: &str,
        scrutinee_union: Option<&str>,
        loc: Loc,
    ) -> Option<IntValue<'ctx>> {
        let tag_ty = match self.lookup_type(tag_name) {
            Some(dt) => dt.clone(),
            None => {
                self.comp_err(
                    format!("union tag {} was not yet declared", tag_name),
                    loc,
                );
                return None;
            }
        };
        if !tag_ty.is_union_tag() {
            self.comp_err(
                format!("{} must be a union tag to be used in a pattern", tag_name),
                loc,
            );
            return None;
        }
        let parent_name = tag_ty.parent_union_name().to_string();
        if let Some(expected) = scrutinee_union {
            if parent_name != expected {
                self.comp_err(
                    format!(
                        "tag {} belongs to union {}, but the matched value is a {}",
                        tag_name, parent_name, expected
                    ),
                    loc,
                );
                return None;
            }
        }
        let parent = self.lookup_type(&parent_name)?.clone();
        Some(
            self.context
                .i8_type()
                .const_int(parent.get_tag_val(tag_name) as u64, false),
        )
    }

    /// Binds a `Tag binder` pattern's payload: the scrutinee is spilled to
    /// union-sized storage, reloaded with the variant's `(u8, payload)`
    /// shape, and field 1 is extracted.
    fn bind_payload(
        &mut self,
        lval: &TypedValue<'ctx>,
        tag_name: &str,
        binder: &str,
        loc: Loc,
    ) -> Option<()> {
        let tag_ty = self.lookup_type(tag_name)?.clone();
        let payload_ty = tag_ty.ty.clone();
        let payload_llvm = self.ty_to_llvm(&payload_ty, loc)?;

        let slot = self
            .builder
            .build_alloca(lval.val.get_type(), "matchtmp")
            .ok()?;
        self.builder.build_store(slot, lval.val).ok()?;

        let variant_ty = self
            .context
            .struct_type(&[self.context.i8_type().into(), payload_llvm], false);
        let variant_ptr_ty = variant_ty.ptr_type(inkwell::AddressSpace::default());
        let variant_slot = self
            .builder
            .build_pointer_cast(slot, variant_ptr_ty, "variantptr")
            .ok()?;
        let variant = self
            .builder
            .build_load(variant_slot, "variant")
            .ok()?
            .into_struct_value();
        let payload = self
            .builder
            .build_extract_value(variant, 1, binder)
            .ok()?;

        self.sto_var(
            binder,
            Variable {
                tval: TypedValue::new(payload, payload_ty),
                scope: self.scope,
                no_free: true,
            },
        );
        Some(())
    }
}
