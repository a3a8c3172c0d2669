//! Operator lowering: primitive arithmetic and comparison selection by type
//! tag, implicit numeric widening, short-circuit logic, index extraction and
//! insertion, casts, and the unary operators including `new`.

use inkwell::values::{BasicValue, BasicValueEnum};
use inkwell::{FloatPredicate, IntPredicate};

use crate::ast::{BinOp, Expr, Loc, UnOp};
use crate::compiler::helpers::{llvm_ty_eq, load_source, undef_of};
use crate::compiler::{Compiler, TypedValue, Variable};
use crate::types::Ty;

impl<'ctx> Compiler<'ctx> {
    pub(crate) fn lower_bin(
        &mut self,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
        loc: Loc,
    ) -> Option<TypedValue<'ctx>> {
        match op {
            BinOp::Dot => return self.lower_member_access(lhs, rhs, loc),
            BinOp::And => return self.lower_logical_and(lhs, rhs, loc),
            BinOp::Or => return self.lower_logical_or(lhs, rhs, loc),
            _ => {}
        }

        let l = self.lower_expr(lhs);
        let r = self.lower_expr(rhs);
        let (l, r) = (l?, r?);

        if op == BinOp::Idx {
            return self.lower_extract(l, r, loc);
        }

        // Numeric operands of unequal tags widen before the operator is
        // chosen; the wider side wins, floats beat integers.
        let (l, r) = self.handle_implicit_conversion(l, r);

        if l.ty.is_numeric() && r.ty.is_numeric() {
            return self.primitive_numeric_op(op, l, r, loc);
        }

        // Booleans support equality only.
        if l.ty == Ty::Bool && r.ty == Ty::Bool {
            match op {
                BinOp::Eq => {
                    let v = self
                        .builder
                        .build_int_compare(
                            IntPredicate::EQ,
                            l.val.into_int_value(),
                            r.val.into_int_value(),
                            "eq",
                        )
                        .ok()?;
                    return Some(TypedValue::new(v.into(), Ty::Bool));
                }
                BinOp::NotEq => {
                    let v = self
                        .builder
                        .build_int_compare(
                            IntPredicate::NE,
                            l.val.into_int_value(),
                            r.val.into_int_value(),
                            "ne",
                        )
                        .ok()?;
                    return Some(TypedValue::new(v.into(), Ty::Bool));
                }
                _ => {}
            }
        }

        // Any other combination resolves through operator overloading:
        // a function named `<op>_<lhsTy>_<rhsTy>`.
        let overload = self.get_mangled_function(op.lexeme(), &[l.ty.clone(), r.ty.clone()]);
        if let Some(f) = overload {
            let func = f.func?;
            let ret = match &f.ty {
                Ty::Func { ret, .. } => (**ret).clone(),
                _ => Ty::Unit,
            };
            let call = self
                .builder
                .build_call(func, &[l.val.into(), r.val.into()], "binop")
                .ok()?;
            let v = call
                .try_as_basic_value()
                .left()
                .unwrap_or_else(|| self.void_literal().val);
            return Some(TypedValue::new(v, ret));
        }

        self.comp_err(
            format!(
                "operator {} is not overloaded for types {} and {}",
                op.lexeme(),
                l.ty,
                r.ty
            ),
            loc,
        )
    }

    /// Arithmetic and comparisons on primitive numerics, selecting the
    /// signed/unsigned/floating variant from the operand tag.
    fn primitive_numeric_op(
        &mut self,
        op: BinOp,
        l: TypedValue<'ctx>,
        r: TypedValue<'ctx>,
        loc: Loc,
    ) -> Option<TypedValue<'ctx>> {
        let ty = l.ty.clone();
        let is_f = ty.is_float();
        let is_u = ty.is_unsigned();

        if is_f {
            let (lf, rf) = (l.val.into_float_value(), r.val.into_float_value());
            let v: BasicValueEnum = match op {
                BinOp::Add => self.builder.build_float_add(lf, rf, "fadd").ok()?.into(),
                BinOp::Sub => self.builder.build_float_sub(lf, rf, "fsub").ok()?.into(),
                BinOp::Mul => self.builder.build_float_mul(lf, rf, "fmul").ok()?.into(),
                BinOp::Div => self.builder.build_float_div(lf, rf, "fdiv").ok()?.into(),
                BinOp::Rem => self.builder.build_float_rem(lf, rf, "frem").ok()?.into(),
                BinOp::Lt | BinOp::Gt | BinOp::LtEq | BinOp::GtEq | BinOp::Eq | BinOp::NotEq => {
                    let pred = match op {
                        BinOp::Lt => FloatPredicate::OLT,
                        BinOp::Gt => FloatPredicate::OGT,
                        BinOp::LtEq => FloatPredicate::OLE,
                        BinOp::GtEq => FloatPredicate::OGE,
                        BinOp::Eq => FloatPredicate::OEQ,
                        _ => FloatPredicate::ONE,
                    };
                    let v = self.builder.build_float_compare(pred, lf, rf, "fcmp").ok()?;
                    return Some(TypedValue::new(v.into(), Ty::Bool));
                }
                _ => {
                    return self.comp_err(
                        format!(
                            "binary operator {} is undefined for the type {}",
                            op.lexeme(),
                            ty
                        ),
                        loc,
                    )
                }
            };
            return Some(TypedValue::new(v, ty));
        }

        let (li, ri) = (l.val.into_int_value(), r.val.into_int_value());
        let v: BasicValueEnum = match op {
            BinOp::Add => self.builder.build_int_add(li, ri, "add").ok()?.into(),
            BinOp::Sub => self.builder.build_int_sub(li, ri, "sub").ok()?.into(),
            BinOp::Mul => self.builder.build_int_mul(li, ri, "mul").ok()?.into(),
            BinOp::Div => {
                if is_u {
                    self.builder.build_int_unsigned_div(li, ri, "udiv").ok()?.into()
                } else {
                    self.builder.build_int_signed_div(li, ri, "sdiv").ok()?.into()
                }
            }
            BinOp::Rem => {
                if is_u {
                    self.builder.build_int_unsigned_rem(li, ri, "urem").ok()?.into()
                } else {
                    self.builder.build_int_signed_rem(li, ri, "srem").ok()?.into()
                }
            }
            BinOp::Xor => self.builder.build_xor(li, ri, "xor").ok()?.into(),
            BinOp::Lt | BinOp::Gt | BinOp::LtEq | BinOp::GtEq | BinOp::Eq | BinOp::NotEq => {
                let pred = match (op, is_u) {
                    (BinOp::Lt, true) => IntPredicate::ULT,
                    (BinOp::Lt, false) => IntPredicate::SLT,
                    (BinOp::Gt, true) => IntPredicate::UGT,
                    (BinOp::Gt, false) => IntPredicate::SGT,
                    (BinOp::LtEq, true) => IntPredicate::ULE,
                    (BinOp::LtEq, false) => IntPredicate::SLE,
                    (BinOp::GtEq, true) => IntPredicate::UGE,
                    (BinOp::GtEq, false) => IntPredicate::SGE,
                    (BinOp::Eq, _) => IntPredicate::EQ,
                    _ => IntPredicate::NE,
                };
                let v = self.builder.build_int_compare(pred, li, ri, "cmp").ok()?;
                return Some(TypedValue::new(v.into(), Ty::Bool));
            }
            _ => {
                return self.comp_err(
                    format!(
                        "binary operator {} is undefined for the type {}",
                        op.lexeme(),
                        ty
                    ),
                    loc,
                )
            }
        };
        Some(TypedValue::new(v, ty))
    }

    /// When two numeric operands meet with unequal tags the smaller widens
    /// to the larger, integer-to-float promotion taking precedence over
    /// width extension; equal widths keep the left side's signedness.
    pub(crate) fn handle_implicit_conversion(
        &mut self,
        l: TypedValue<'ctx>,
        r: TypedValue<'ctx>,
    ) -> (TypedValue<'ctx>, TypedValue<'ctx>) {
        if !l.ty.is_numeric() || !r.ty.is_numeric() || l.ty == r.ty {
            return (l, r);
        }
        if l.ty.widen_rank() >= r.ty.widen_rank() {
            let target = l.ty.clone();
            let r = self.implicitly_widen_num(r, &target);
            (l, r)
        } else {
            let target = r.ty.clone();
            let l = self.implicitly_widen_num(l, &target);
            (l, r)
        }
    }

    /// Widens a numeric value to the target tag: float extension, integer
    /// promotion to float (respecting the source's signedness), or integer
    /// extension (sign- or zero-extended by the source's signedness).
    pub(crate) fn implicitly_widen_num(
        &mut self,
        tv: TypedValue<'ctx>,
        target: &Ty,
    ) -> TypedValue<'ctx> {
        if tv.ty == *target || !tv.ty.is_numeric() || !target.is_numeric() {
            return tv;
        }
        let loc = Loc::default();
        let Some(target_llvm) = self.ty_to_llvm(target, loc) else {
            return tv;
        };
        let v: Option<BasicValueEnum> = if target.is_float() {
            if tv.ty.is_float() {
                self.builder
                    .build_float_cast(
                        tv.val.into_float_value(),
                        target_llvm.into_float_type(),
                        "fwiden",
                    )
                    .ok()
                    .map(Into::into)
            } else if tv.ty.is_unsigned() {
                self.builder
                    .build_unsigned_int_to_float(
                        tv.val.into_int_value(),
                        target_llvm.into_float_type(),
                        "uitofp",
                    )
                    .ok()
                    .map(Into::into)
            } else {
                self.builder
                    .build_signed_int_to_float(
                        tv.val.into_int_value(),
                        target_llvm.into_float_type(),
                        "sitofp",
                    )
                    .ok()
                    .map(Into::into)
            }
        } else if tv.ty.is_int() {
            self.builder
                .build_int_cast_sign_flag(
                    tv.val.into_int_value(),
                    target_llvm.into_int_type(),
                    !tv.ty.is_unsigned(),
                    "widen",
                )
                .ok()
                .map(Into::into)
        } else {
            None
        };
        match v {
            Some(v) => TypedValue::new(v, target.clone()),
            None => tv,
        }
    }

    /// The extract operator `#`. Arrays and pointers index through address
    /// arithmetic and a load; tuples and records need a compile-time
    /// constant index and return the statically-typed field.
    pub(crate) fn lower_extract(
        &mut self,
        l: TypedValue<'ctx>,
        r: TypedValue<'ctx>,
        loc: Loc,
    ) -> Option<TypedValue<'ctx>> {
        if !r.ty.is_int() {
            return self.comp_err(
                format!(
                    "index of operator '#' must be an integer expression, got expression of type {}",
                    r.ty
                ),
                loc,
            );
        }

        match l.ty.clone() {
            Ty::Array(elem) | Ty::Ptr(elem) => {
                if !l.val.is_pointer_value() {
                    return self.comp_err(
                        format!("type {} does not have elements to access", l.ty),
                        loc,
                    );
                }
                self.ty_to_llvm(&elem, loc)?;
                let gep = unsafe {
                    self.builder
                        .build_in_bounds_gep(
                            l.val.into_pointer_value(),
                            &[r.val.into_int_value()],
                            "idx",
                        )
                        .ok()?
                };
                let v = self.builder.build_load(gep, "elem").ok()?;
                Some(TypedValue::new(v, *elem))
            }
            Ty::Tuple(elems) => {
                let index = self.const_index(&r, loc)?;
                let elem_ty = match elems.get(index as usize) {
                    Some(t) => t.clone(),
                    None => {
                        return self.comp_err(format!("tuple index {} out of bounds", index), loc)
                    }
                };
                let v = self
                    .builder
                    .build_extract_value(l.val.into_struct_value(), index as u32, "extract")
                    .ok()?;
                Some(TypedValue::new(v, elem_ty))
            }
            Ty::Data(name) => {
                let index = self.const_index(&r, loc)?;
                let dt = self.lookup_type(&name)?.clone();
                let elem_ty = dt.field_ty(index as usize)?.clone();
                let v = match &dt.ty {
                    Ty::Tuple(_) => self
                        .builder
                        .build_extract_value(l.val.into_struct_value(), index as u32, "extract")
                        .ok()?,
                    _ => l.val,
                };
                Some(TypedValue::new(v, elem_ty))
            }
            other => self.comp_err(
                format!("type {} does not have elements to access", other),
                loc,
            ),
        }
    }

    fn const_index(&mut self, r: &TypedValue<'ctx>, loc: Loc) -> Option<u64> {
        let iv = r.val.into_int_value();
        if !iv.is_const() {
            self.comp_err("tuple indices must always be known at compile time", loc);
            return None;
        }
        iv.get_zero_extended_constant()
    }

    /// The insert form of `#`: `xs#i = e`. Arrays and pointers store
    /// through address arithmetic; tuples and records rebuild the aggregate
    /// and store it back into the target's stack slot.
    pub(crate) fn lower_insert(
        &mut self,
        target: &Expr,
        index: &Expr,
        expr: &Expr,
        loc: Loc,
    ) -> Option<TypedValue<'ctx>> {
        let tmp = self.lower_expr(target)?;
        let var = match load_source(tmp.val) {
            Some(ptr) => ptr,
            None => {
                return self.comp_err(
                    format!(
                        "variable must be mutable to insert values, but instead is an immutable {}",
                        tmp.ty
                    ),
                    target.loc(),
                )
            }
        };

        let idx = self.lower_expr(index)?;
        if !idx.ty.is_int() {
            return self.comp_err(
                format!(
                    "index of operator '#' must be an integer expression, got expression of type {}",
                    idx.ty
                ),
                index.loc(),
            );
        }
        let new_val = self.lower_expr(expr)?;

        match tmp.ty.clone() {
            Ty::Array(elem) | Ty::Ptr(elem) => {
                if *elem != new_val.ty {
                    return self.comp_err(
                        format!("cannot store a {} into elements of {}", new_val.ty, tmp.ty),
                        expr.loc(),
                    );
                }
                self.ty_to_llvm(&elem, loc)?;
                let dest = unsafe {
                    self.builder
                        .build_in_bounds_gep(
                            tmp.val.into_pointer_value(),
                            &[idx.val.into_int_value()],
                            "insidx",
                        )
                        .ok()?
                };
                self.builder.build_store(dest, new_val.val).ok()?;
                Some(self.void_literal())
            }
            Ty::Tuple(_) | Ty::Data(_) => {
                let i = self.const_index(&idx, loc)?;
                if !tmp.val.is_struct_value() {
                    // A single-field record has no aggregate to rebuild.
                    if i != 0 || !llvm_ty_eq(tmp.val, new_val.val) {
                        return self.comp_err(
                            format!("index {} out of bounds for type {}", i, tmp.ty),
                            loc,
                        );
                    }
                    self.builder.build_store(var, new_val.val).ok()?;
                    return Some(self.void_literal());
                }
                let struct_val = tmp.val.into_struct_value();
                let field_llvm = struct_val.get_type().get_field_type_at_index(i as u32);
                match field_llvm {
                    Some(ft) if ft == new_val.val.get_type() => {}
                    Some(ft) => {
                        return self.comp_err(
                            format!(
                                "cannot assign expression of type {} to index {} of type {:?}",
                                new_val.ty, i, ft
                            ),
                            expr.loc(),
                        )
                    }
                    None => {
                        return self.comp_err(format!("index {} out of bounds", i), loc);
                    }
                }
                let updated = self
                    .builder
                    .build_insert_value(struct_val, new_val.val, i as u32, "ins")
                    .ok()?
                    .into_struct_value();
                self.builder.build_store(var, updated).ok()?;
                Some(self.void_literal())
            }
            other => self.comp_err(
                format!(
                    "variable being indexed must be an array or tuple, but instead is a(n) {}",
                    other
                ),
                loc,
            ),
        }
    }

    /// Short-circuit `and`: the right side only evaluates when the left is
    /// true; the merge block's PHI collects the constant and the right value.
    pub(crate) fn lower_logical_and(
        &mut self,
        lhs: &Expr,
        rhs: &Expr,
        loc: Loc,
    ) -> Option<TypedValue<'ctx>> {
        self.lower_short_circuit(lhs, rhs, loc, false)
    }

    pub(crate) fn lower_logical_or(
        &mut self,
        lhs: &Expr,
        rhs: &Expr,
        loc: Loc,
    ) -> Option<TypedValue<'ctx>> {
        self.lower_short_circuit(lhs, rhs, loc, true)
    }

    fn lower_short_circuit(
        &mut self,
        lhs: &Expr,
        rhs: &Expr,
        _loc: Loc,
        is_or: bool,
    ) -> Option<TypedValue<'ctx>> {
        let f = self
            .builder
            .get_insert_block()?
            .get_parent()?;

        let l = self.lower_expr(lhs)?;
        if l.ty != Ty::Bool {
            return self.comp_err(
                format!(
                    "the '{}' operator's left side must be of type bool, but instead is of type {}",
                    if is_or { "or" } else { "and" },
                    l.ty
                ),
                lhs.loc(),
            );
        }
        let lhs_block = self.builder.get_insert_block()?;
        let rhs_bb = self
            .context
            .append_basic_block(f, if is_or { "or" } else { "and" });
        let merge_bb = self.context.append_basic_block(f, "merge");

        if is_or {
            self.builder
                .build_conditional_branch(l.val.into_int_value(), merge_bb, rhs_bb)
                .ok()?;
        } else {
            self.builder
                .build_conditional_branch(l.val.into_int_value(), rhs_bb, merge_bb)
                .ok()?;
        }

        self.builder.position_at_end(rhs_bb);
        let r = self.lower_expr(rhs)?;
        // The right side may itself branch; the incoming block for the PHI
        // is wherever its lowering finished.
        let rhs_block = self.builder.get_insert_block()?;
        self.builder.build_unconditional_branch(merge_bb).ok()?;

        if r.ty != Ty::Bool {
            return self.comp_err(
                format!(
                    "the '{}' operator's right side must be of type bool, but instead is of type {}",
                    if is_or { "or" } else { "and" },
                    r.ty
                ),
                rhs.loc(),
            );
        }

        self.builder.position_at_end(merge_bb);
        let phi = self
            .builder
            .build_phi(self.context.bool_type(), "sc")
            .ok()?;
        let short = self.context.bool_type().const_int(is_or as u64, false);
        phi.add_incoming(&[(&short, lhs_block), (&r.val, rhs_block)]);
        Some(TypedValue::new(phi.as_basic_value(), Ty::Bool))
    }

    // --- unary operators ---

    pub(crate) fn lower_un(
        &mut self,
        op: UnOp,
        rhs: &Expr,
        loc: Loc,
    ) -> Option<TypedValue<'ctx>> {
        let r = self.lower_expr(rhs)?;
        match op {
            UnOp::Deref => match r.ty.clone() {
                Ty::Ptr(inner) => {
                    self.ty_to_llvm(&inner, loc)?;
                    let v = self
                        .builder
                        .build_load(r.val.into_pointer_value(), "deref")
                        .ok()?;
                    Some(TypedValue::new(v, *inner))
                }
                other => {
                    self.comp_err(format!("cannot dereference non-pointer type {}", other), loc)
                }
            },
            UnOp::Neg => {
                if r.ty.is_float() {
                    let v = self
                        .builder
                        .build_float_neg(r.val.into_float_value(), "fneg")
                        .ok()?;
                    Some(TypedValue::new(v.into(), r.ty))
                } else if r.ty.is_int() {
                    let v = self
                        .builder
                        .build_int_neg(r.val.into_int_value(), "neg")
                        .ok()?;
                    Some(TypedValue::new(v.into(), r.ty))
                } else {
                    self.comp_err(format!("cannot negate a value of type {}", r.ty), loc)
                }
            }
            UnOp::Not => {
                if r.ty == Ty::Bool || r.ty.is_int() {
                    let v = self.builder.build_not(r.val.into_int_value(), "not").ok()?;
                    Some(TypedValue::new(v.into(), r.ty))
                } else {
                    self.comp_err(
                        format!("logical negation is undefined for type {}", r.ty),
                        loc,
                    )
                }
            }
            UnOp::New => self.lower_new(r, loc),
        }
    }

    /// `new e` heap-allocates through the externally-declared `malloc`,
    /// stores the operand, and binds the pointer to a generated name
    /// flagged freeable so scope exit releases it.
    fn lower_new(&mut self, r: TypedValue<'ctx>, loc: Loc) -> Option<TypedValue<'ctx>> {
        let size = self.size_in_bits(&r.ty, loc)? / 8;
        let malloc = match self.get_function("malloc") {
            Some(f) => f,
            None => {
                return self.comp_err(
                    "no declaration of malloc found; is the prelude missing?",
                    loc,
                )
            }
        };
        let malloc_fn = malloc.func?;

        let size_val = self.context.i32_type().const_int(size, true);
        let call = self
            .builder
            .build_call(malloc_fn, &[size_val.into()], "malloc")
            .ok()?;
        let raw = call.try_as_basic_value().left()?;
        let ptr = raw.into_pointer_value();

        self.builder.build_store(ptr, r.val).ok()?;

        let tv = TypedValue::new(ptr.into(), Ty::ptr_to(r.ty));
        // The generated name starts uppercase so source code can never
        // reference the temporary; scope exit frees it.
        let tmp_name = self.fresh_tmp_name();
        self.sto_var(
            &tmp_name,
            Variable {
                tval: tv.clone(),
                scope: self.scope,
                no_free: false,
            },
        );
        Some(tv)
    }

    // --- casts ---

    /// A cast first searches for a user-provided `<TargetT>_Cast` function,
    /// then falls back on the built-in conversions, and finally on the
    /// structural cast between a nominal type and its underlying shape.
    pub(crate) fn lower_cast(
        &mut self,
        target: &Ty,
        expr: &Expr,
        loc: Loc,
    ) -> Option<TypedValue<'ctx>> {
        let val = self.lower_expr(expr)?;
        let from = val.ty.clone();
        let had_err = self.err_flag;
        match self.create_cast(target, val, loc) {
            Some(tv) => Some(tv),
            // A nested error was already reported; otherwise this cast is
            // the problem.
            None if self.err_flag && !had_err => None,
            None => self.comp_err(format!("invalid type cast {} -> {}", from, target), loc),
        }
    }

    pub(crate) fn create_cast(
        &mut self,
        target: &Ty,
        val: TypedValue<'ctx>,
        loc: Loc,
    ) -> Option<TypedValue<'ctx>> {
        // 1. User-provided cast function mangled with the operand's type.
        let cast_base = format!("{}_Cast", target);
        if let Some(f) = self.get_mangled_function(&cast_base, &[val.ty.clone()]) {
            if let Ty::Func { ret, params } = &f.ty {
                if params.len() == 1 && params[0] == val.ty {
                    let func = f.func?;
                    let call = self
                        .builder
                        .build_call(func, &[val.val.into()], "cast")
                        .ok()?;
                    let v = call.try_as_basic_value().left()?;
                    return Some(TypedValue::new(v, (**ret).clone()));
                }
            }
        }

        // 2. Built-in conversions.
        if val.ty.is_int() && target.is_int() {
            let tll = self.ty_to_llvm(target, loc)?.into_int_type();
            let v = self
                .builder
                .build_int_cast_sign_flag(
                    val.val.into_int_value(),
                    tll,
                    !target.is_unsigned(),
                    "icast",
                )
                .ok()?;
            return Some(TypedValue::new(v.into(), target.clone()));
        }
        if val.ty.is_int() && target.is_float() {
            let tll = self.ty_to_llvm(target, loc)?.into_float_type();
            let v: BasicValueEnum = if val.ty.is_unsigned() {
                self.builder
                    .build_unsigned_int_to_float(val.val.into_int_value(), tll, "uitofp")
                    .ok()?
                    .into()
            } else {
                self.builder
                    .build_signed_int_to_float(val.val.into_int_value(), tll, "sitofp")
                    .ok()?
                    .into()
            };
            return Some(TypedValue::new(v, target.clone()));
        }
        if val.ty.is_int() && matches!(target, Ty::Ptr(_)) {
            let ptr_ty = self.context.i8_type().ptr_type(inkwell::AddressSpace::default());
            let v = self
                .builder
                .build_int_to_ptr(val.val.into_int_value(), ptr_ty, "itop")
                .ok()?;
            return Some(TypedValue::new(v.into(), target.clone()));
        }
        if val.ty.is_float() && target.is_int() {
            let tll = self.ty_to_llvm(target, loc)?.into_int_type();
            let v: BasicValueEnum = if target.is_unsigned() {
                self.builder
                    .build_float_to_unsigned_int(val.val.into_float_value(), tll, "fptoui")
                    .ok()?
                    .into()
            } else {
                self.builder
                    .build_float_to_signed_int(val.val.into_float_value(), tll, "fptosi")
                    .ok()?
                    .into()
            };
            return Some(TypedValue::new(v, target.clone()));
        }
        if val.ty.is_float() && target.is_float() {
            let tll = self.ty_to_llvm(target, loc)?.into_float_type();
            let v = self
                .builder
                .build_float_cast(val.val.into_float_value(), tll, "fcast")
                .ok()?;
            return Some(TypedValue::new(v.into(), target.clone()));
        }
        if matches!(val.ty, Ty::Ptr(_) | Ty::Array(_)) {
            if matches!(target, Ty::Ptr(_) | Ty::Array(_)) {
                let ptr_ty = self.context.i8_type().ptr_type(inkwell::AddressSpace::default());
                let v = self
                    .builder
                    .build_pointer_cast(val.val.into_pointer_value(), ptr_ty, "pcast")
                    .ok()?;
                return Some(TypedValue::new(v.into(), target.clone()));
            }
            if target.is_int() {
                let tll = self.ty_to_llvm(target, loc)?.into_int_type();
                let v = self
                    .builder
                    .build_ptr_to_int(val.val.into_pointer_value(), tll, "ptoi")
                    .ok()?;
                return Some(TypedValue::new(v.into(), target.clone()));
            }
        }

        // 3. Structural cast between a nominal type and its underlying
        // shape. Constructing a union-tag type from its payload materializes
        // the (tag, payload) pair in union-sized storage.
        if let Ty::Data(name) = target {
            let dt = self.lookup_type(name).cloned();
            if let Some(dt) = dt {
                if val.ty == dt.ty {
                    if dt.is_union_tag() {
                        return self.construct_union_value(name, &dt, val, loc);
                    }
                    return Some(TypedValue::new(val.val, Ty::Data(name.clone())));
                }
                // A payloadless tag constructed explicitly.
                if dt.is_union_tag() && dt.ty == Ty::Unit {
                    return self.lower_type_ref(&Ty::Data(name.clone()), loc);
                }
            }
        }

        // The reverse direction: a nominal value cast to its shape.
        if let Ty::Data(name) = &val.ty {
            if let Some(dt) = self.lookup_type(name) {
                if dt.ty == *target {
                    return Some(TypedValue::new(val.val, target.clone()));
                }
            }
        }

        None
    }

    /// Builds a tagged-union value for tag `name` with payload `val`:
    /// `(u8 tag, payload)` is stored into storage sized for the whole union
    /// and reloaded as the parent union type.
    fn construct_union_value(
        &mut self,
        name: &str,
        dt: &crate::compiler::DataType,
        val: TypedValue<'ctx>,
        loc: Loc,
    ) -> Option<TypedValue<'ctx>> {
        let parent_name = dt.parent_union_name().to_string();
        let parent = self.lookup_type(&parent_name)?.clone();
        let tag = self
            .context
            .i8_type()
            .const_int(parent.get_tag_val(name) as u64, false);

        // The variant-shaped pair (u8 tag, payload), with the payload
        // inserted after the constant skeleton.
        let payload_llvm = val.val.get_type();
        let uninit = self
            .context
            .const_struct(&[tag.into(), undef_of(payload_llvm)], false);
        let tagged = self
            .builder
            .build_insert_value(uninit, val.val, 1, "variant")
            .ok()?
            .into_struct_value();

        let union_ty = Ty::Union(parent_name);
        let union_llvm = self.ty_to_llvm(&union_ty, loc)?;
        let slot = self.builder.build_alloca(union_llvm, "union").ok()?;
        self.builder.build_store(slot, tagged).ok()?;
        let v = self.builder.build_load(slot, "unionval").ok()?;
        Some(TypedValue::new(v, union_ty))
    }
}
