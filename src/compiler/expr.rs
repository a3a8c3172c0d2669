//! Expression lowering: literals, variables, bindings, assignment targets,
//! and member access.

use inkwell::types::BasicType;
use inkwell::values::BasicValue;

use crate::ast::{Expr, Loc};
use crate::compiler::helpers::{is_alloca, is_const_value, llvm_ty_eq, load_source, undef_of};
use crate::compiler::{Compiler, TypedValue, Variable};
use crate::types::Ty;

impl<'ctx> Compiler<'ctx> {
    pub(crate) fn lower_int_lit(
        &mut self,
        val: &str,
        ty: &Ty,
        loc: Loc,
    ) -> Option<TypedValue<'ctx>> {
        let parsed: u64 = match val.parse::<i128>() {
            Ok(v) => v as u64,
            Err(_) => return self.comp_err(format!("integer literal {} is out of range", val), loc),
        };
        let llvm_ty = self.ty_to_llvm(ty, loc)?.into_int_type();
        let v = llvm_ty.const_int(parsed, !ty.is_unsigned());
        Some(TypedValue::new(v.into(), ty.clone()))
    }

    pub(crate) fn lower_flt_lit(
        &mut self,
        val: &str,
        ty: &Ty,
        loc: Loc,
    ) -> Option<TypedValue<'ctx>> {
        let parsed: f64 = match val.parse() {
            Ok(v) => v,
            Err(_) => return self.comp_err(format!("invalid float literal {}", val), loc),
        };
        let llvm_ty = self.ty_to_llvm(ty, loc)?.into_float_type();
        let v = llvm_ty.const_float(parsed);
        Some(TypedValue::new(v.into(), ty.clone()))
    }

    /// A string literal materializes as the `Str` record: a pointer to the
    /// interned c-string and its 32-bit length.
    pub(crate) fn lower_str_lit(&mut self, val: &str) -> Option<TypedValue<'ctx>> {
        let gv = self.builder.build_global_string_ptr(val, "str").ok()?;
        let ptr = gv.as_pointer_value();
        let len = self.context.i32_type().const_int(val.len() as u64, false);
        let s = self
            .context
            .const_struct(&[ptr.as_basic_value_enum(), len.into()], false);
        Some(TypedValue::new(s.into(), Ty::Data("Str".to_string())))
    }

    /// An array literal fills a stack allocation and decays to a pointer to
    /// its first element. The element type is inferred from the first
    /// element; later elements must agree structurally.
    pub(crate) fn lower_array_lit(
        &mut self,
        elems: &[Expr],
        loc: Loc,
    ) -> Option<TypedValue<'ctx>> {
        if elems.is_empty() {
            return self.comp_err("cannot infer the element type of an empty array", loc);
        }
        let mut vals = Vec::with_capacity(elems.len());
        for e in elems {
            vals.push(self.lower_expr(e)?);
        }
        let elem_ty = vals[0].ty.clone();
        let elem_llvm = vals[0].val.get_type();
        for v in &vals[1..] {
            if v.val.get_type() != elem_llvm {
                return self.comp_err("array literal elements must share one type", loc);
            }
        }

        let arr_ty = elem_llvm.array_type(vals.len() as u32);
        let slot = self.builder.build_alloca(arr_ty, "arr").ok()?;
        let i64t = self.context.i64_type();
        for (i, v) in vals.iter().enumerate() {
            let idx = [i64t.const_zero(), i64t.const_int(i as u64, false)];
            let gep = unsafe {
                self.builder
                    .build_in_bounds_gep(slot, &idx, "arrinit")
                    .ok()?
            };
            self.builder.build_store(gep, v.val).ok()?;
        }
        let zero = [i64t.const_zero(), i64t.const_zero()];
        let first = unsafe {
            self.builder
                .build_in_bounds_gep(slot, &zero, "arrdecay")
                .ok()?
        };
        Some(TypedValue::new(
            first.into(),
            Ty::Array(Box::new(elem_ty)),
        ))
    }

    /// A tuple literal builds a constant aggregate with undef placeholders
    /// for the non-constant elements, then inserts those dynamically. The
    /// empty tuple is the unit value.
    pub(crate) fn lower_tuple_lit(&mut self, elems: &[Expr]) -> Option<TypedValue<'ctx>> {
        if elems.is_empty() {
            return Some(self.void_literal());
        }
        let mut vals = Vec::with_capacity(elems.len());
        for e in elems {
            vals.push(self.lower_expr(e)?);
        }

        let mut consts = Vec::with_capacity(vals.len());
        let mut pathogens = Vec::new();
        for (i, v) in vals.iter().enumerate() {
            if is_const_value(v.val) {
                consts.push(v.val);
            } else {
                pathogens.push((i, v.val));
                consts.push(undef_of(v.val.get_type()));
            }
        }

        let mut tuple = self.context.const_struct(&consts, false);
        for (i, v) in pathogens {
            tuple = self
                .builder
                .build_insert_value(tuple, v, i as u32, "tupins")
                .ok()?
                .into_struct_value();
        }

        let tys = vals.into_iter().map(|v| v.ty).collect();
        Some(TypedValue::new(tuple.into(), Ty::Tuple(tys)))
    }

    /// Loads a variable. Stack-slot bindings load through the slot; other
    /// bindings yield their value directly. An unbound name falls back to
    /// the function-declaration table (triggering lazy compilation).
    pub(crate) fn lower_var(&mut self, name: &str, loc: Loc) -> Option<TypedValue<'ctx>> {
        if let Some(var) = self.lookup(name).cloned() {
            if is_alloca(var.tval.val) {
                self.ty_to_llvm(&var.tval.ty, loc)?;
                let v = self
                    .builder
                    .build_load(var.tval.val.into_pointer_value(), name)
                    .ok()?;
                return Some(TypedValue::new(v, var.tval.ty.clone()));
            }
            return Some(var.tval);
        }
        match self.get_function(name) {
            Some(f) => Some(f),
            None => self.comp_err(
                format!("variable or function '{}' has not been declared", name),
                loc,
            ),
        }
    }

    /// An enum value: a bare union tag in expression position materializes
    /// the parent union with only the tag byte initialized.
    pub(crate) fn lower_type_ref(&mut self, ty: &Ty, loc: Loc) -> Option<TypedValue<'ctx>> {
        let name = match ty {
            Ty::Data(n) | Ty::Union(n) => n.clone(),
            other => return self.comp_err(format!("type {} is not a value", other), loc),
        };
        let data_ty = match self.lookup_type(&name) {
            Some(dt) => dt.clone(),
            None => return self.comp_err(format!("use of undeclared type {}", name), loc),
        };
        if !data_ty.is_union_tag() {
            return self.comp_err(format!("type {} is not a value", name), loc);
        }
        let parent_name = data_ty.parent_union_name().to_string();
        let parent = match self.lookup_type(&parent_name) {
            Some(dt) => dt.clone(),
            None => {
                return self.comp_err(format!("use of undeclared type {}", parent_name), loc)
            }
        };

        let tag = self
            .context
            .i8_type()
            .const_int(parent.get_tag_val(&name) as u64, false);
        let union_ty = Ty::Union(parent_name);
        let union_llvm = self.ty_to_llvm(&union_ty, loc)?;

        // Storage sized for the whole union; only the tag byte is written.
        let slot = self.builder.build_alloca(union_llvm, "uniontag").ok()?;
        self.builder.build_store(slot, tag).ok()?;
        let val = self.builder.build_load(slot, "union").ok()?;
        Some(TypedValue::new(val, union_ty))
    }

    /// `let` binds the compiled initializer at the current scope without a
    /// stack slot; rebinding the value never frees it.
    pub(crate) fn lower_let(
        &mut self,
        name: &str,
        decl_ty: Option<&Ty>,
        expr: &Expr,
        _loc: Loc,
    ) -> Option<TypedValue<'ctx>> {
        let val = self.lower_expr(expr)?;
        if let Some(t) = decl_ty {
            let resolved = self.resolve_named(t);
            let want = self.ty_to_llvm(&resolved, expr.loc())?;
            if val.val.get_type() != want {
                return self.comp_err("incompatible types in explicit binding", expr.loc());
            }
        }
        self.sto_var(
            name,
            Variable {
                tval: val.clone(),
                scope: self.scope,
                no_free: true,
            },
        );
        Some(val)
    }

    /// `mut` allocates a stack slot typed by the declared type or the
    /// initializer's inferred type, stores the initializer when present,
    /// and binds the slot. Redeclaration in the same scope is an error.
    pub(crate) fn lower_var_decl(
        &mut self,
        name: &str,
        decl_ty: Option<&Ty>,
        init: Option<&Expr>,
        loc: Loc,
    ) -> Option<TypedValue<'ctx>> {
        if self.declared_in_current_scope(name) {
            return self.comp_err(format!("variable {} was redeclared", name), loc);
        }

        let decl_ty = decl_ty.map(|t| self.resolve_named(t));
        let (slot_ty, var_ty) = match &decl_ty {
            Some(t) => (self.ty_to_llvm(t, loc)?, t.clone()),
            None => {
                // Inferred from the initializer, which the grammar
                // guarantees to exist in this case.
                let val = self.lower_expr(init?)?;
                let slot = self.builder.build_alloca(val.val.get_type(), name).ok()?;
                self.builder.build_store(slot, val.val).ok()?;
                self.sto_var(
                    name,
                    Variable {
                        tval: TypedValue::new(slot.into(), val.ty.clone()),
                        scope: self.scope,
                        no_free: true,
                    },
                );
                return Some(self.void_literal());
            }
        };

        let slot = self.builder.build_alloca(slot_ty, name).ok()?;
        self.sto_var(
            name,
            Variable {
                tval: TypedValue::new(slot.into(), var_ty.clone()),
                scope: self.scope,
                no_free: true,
            },
        );
        if let Some(init) = init {
            let val = self.lower_expr(init)?;
            if val.val.get_type() != slot_ty {
                return self.comp_err(
                    format!(
                        "cannot assign expression of type {} to a variable of type {}",
                        val.ty, var_ty
                    ),
                    init.loc(),
                );
            }
            self.builder.build_store(slot, val.val).ok()?;
        }
        Some(self.void_literal())
    }

    /// Assignment dispatch: an indexed target delegates to the insert
    /// routine, a field target to field insertion; otherwise the target
    /// must load from a stack slot and the value is stored back through it.
    pub(crate) fn lower_assign(
        &mut self,
        target: &Expr,
        expr: &Expr,
        loc: Loc,
    ) -> Option<TypedValue<'ctx>> {
        use crate::ast::BinOp;
        if let Expr::Bin { op, lhs, rhs, loc } = target {
            match op {
                BinOp::Idx => return self.lower_insert(lhs, rhs, expr, *loc),
                BinOp::Dot => return self.lower_field_insert(lhs, rhs, expr, *loc),
                _ => {}
            }
        }

        let tmp = self.lower_expr(target)?;
        let dest = match load_source(tmp.val) {
            Some(ptr) => ptr,
            None => {
                return self.comp_err(
                    format!(
                        "variable must be mutable to be assigned to, but instead is an immutable {}",
                        tmp.ty
                    ),
                    target.loc(),
                )
            }
        };

        let val = self.lower_expr(expr)?;
        if !llvm_ty_eq(tmp.val, val.val) {
            return self.comp_err(
                format!(
                    "cannot assign expression of type {} to a variable of type {}",
                    val.ty, tmp.ty
                ),
                loc,
            );
        }
        self.builder.build_store(dest, val.val).ok()?;
        Some(self.void_literal())
    }

    /// Field insertion, `v.x = e`. The target must be mutable; the `.`
    /// operator auto-dereferences pointers before resolving the field.
    pub(crate) fn lower_field_insert(
        &mut self,
        obj: &Expr,
        field: &Expr,
        expr: &Expr,
        loc: Loc,
    ) -> Option<TypedValue<'ctx>> {
        let field_name = match field {
            Expr::Var { name, .. } => name.clone(),
            _ => return self.comp_err("expected a field name after '.'", loc),
        };
        if let Expr::TypeRef { ty, .. } = obj {
            return self.comp_err(
                format!("cannot insert a value into static module '{}'", ty),
                obj.loc(),
            );
        }

        let l = self.lower_expr(obj)?;
        if load_source(l.val).is_none() {
            return self.comp_err(
                format!(
                    "variable must be mutable to be assigned to, but instead is an immutable {}",
                    l.ty
                ),
                obj.loc(),
            );
        }

        let (val, ty) = self.auto_deref(l.val, l.ty, loc)?;
        // The slot the updated aggregate is stored back into.
        let dest = match load_source(val) {
            Some(ptr) => ptr,
            None => return self.comp_err("assignment target has no storage", obj.loc()),
        };

        if let Ty::Data(name) = &ty {
            if let Some(dt) = self.lookup_type(name).cloned() {
                if let Some(index) = dt.get_field_index(&field_name) {
                    let field_ty = dt.field_ty(index)?.clone();
                    let new_val = self.lower_expr(expr)?;
                    if new_val.ty != field_ty {
                        return self.comp_err(
                            format!(
                                "cannot assign expression of type {} to a field of type {}",
                                new_val.ty, field_ty
                            ),
                            expr.loc(),
                        );
                    }
                    let updated = match &dt.ty {
                        Ty::Tuple(_) => self
                            .builder
                            .build_insert_value(
                                val.into_struct_value(),
                                new_val.val,
                                index as u32,
                                "fieldins",
                            )
                            .ok()?
                            .into_struct_value()
                            .as_basic_value_enum(),
                        _ => new_val.val,
                    };
                    self.builder.build_store(dest, updated).ok()?;
                    return Some(self.void_literal());
                }
            }
        }

        self.comp_err(
            format!("method or field {} not found in type {}", field_name, ty),
            loc,
        )
    }

    /// Dereferences through any number of pointers, loading at each step.
    pub(crate) fn auto_deref(
        &mut self,
        mut val: inkwell::values::BasicValueEnum<'ctx>,
        mut ty: Ty,
        loc: Loc,
    ) -> Option<(inkwell::values::BasicValueEnum<'ctx>, Ty)> {
        while let Ty::Ptr(inner) = ty {
            self.ty_to_llvm(&inner, loc)?;
            val = self
                .builder
                .build_load(val.into_pointer_value(), "autoderef")
                .ok()?;
            ty = *inner;
        }
        Some((val, ty))
    }

    /// Member access, `a.b`. A type-name left side is a static method
    /// lookup; otherwise the value is auto-dereferenced and treated as a
    /// record field extract or a bound method.
    pub(crate) fn lower_member_access(
        &mut self,
        obj: &Expr,
        field: &Expr,
        loc: Loc,
    ) -> Option<TypedValue<'ctx>> {
        let field_name = match field {
            Expr::Var { name, .. } => name.clone(),
            _ => return self.comp_err("expected a field or method name after '.'", loc),
        };

        if let Expr::TypeRef { ty, .. } = obj {
            let fn_name = format!("{}_{}", ty, field_name);
            return match self.get_function(&fn_name) {
                Some(f) => Some(f),
                None => self.comp_err(
                    format!(
                        "no static method called '{}' was found in type {}",
                        field_name, ty
                    ),
                    loc,
                ),
            };
        }

        let l = self.lower_expr(obj)?;
        let (val, ty) = self.auto_deref(l.val, l.ty, loc)?;

        if let Ty::Data(name) = &ty {
            if let Some(dt) = self.lookup_type(name).cloned() {
                if let Some(index) = dt.get_field_index(&field_name) {
                    let field_ty = dt.field_ty(index)?.clone();
                    let v = match &dt.ty {
                        Ty::Tuple(_) => self
                            .builder
                            .build_extract_value(
                                val.into_struct_value(),
                                index as u32,
                                &field_name,
                            )
                            .ok()?,
                        // Single-field records are not wrapped in a struct.
                        _ => val,
                    };
                    return Some(TypedValue::new(v, field_ty));
                }
            }
        }

        // Not a field; look for a bound method on the receiver's type.
        let fn_name = format!("{}_{}", ty, field_name);
        if let Some(f) = self.get_function(&fn_name) {
            let mut method = f;
            if let Ty::Func { ret, params } = method.ty.clone() {
                method.ty = Ty::Method { ret, params };
            }
            method.receiver = Some(Box::new(TypedValue::new(val, ty)));
            return Some(method);
        }

        self.comp_err(
            format!("method or field {} not found in type {}", field_name, ty),
            loc,
        )
    }
}
