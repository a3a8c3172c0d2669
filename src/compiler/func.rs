//! Function compilation: registration with name mangling, the explicit and
//! inferred return-type paths, compiler directives, and call lowering with
//! the argument conversion pipeline.

use inkwell::attributes::{Attribute, AttributeLoc};
use inkwell::module::Module;
use inkwell::values::{BasicMetadataValueEnum, FunctionValue};
use inkwell::OptimizationLevel;

use crate::ast::{self, Expr, Loc};
use crate::compiler::{Compiler, FnDecl, TypedValue, Variable};
use crate::diagnostics;
use crate::types::{mangle, Ty};

impl<'ctx> Compiler<'ctx> {
    /// Enters a named function into the declaration table without emitting
    /// IR. Lowercase- and underscore-initial names keep their plain
    /// (prefixed) spelling; anything else — capitalized names and operator
    /// overloads — is mangled with its parameter types to allow
    /// overloading.
    pub(crate) fn register_function(&mut self, mut node: ast::FuncDecl) {
        let plain = node
            .name
            .chars()
            .next()
            .map_or(false, |c| c.is_ascii_lowercase() || c == '_');
        let mangled = if plain {
            format!("{}{}", self.func_prefix, node.name)
        } else {
            let param_tys: Vec<Ty> = node.params.iter().map(|(_, t)| t.clone()).collect();
            format!("{}{}", self.func_prefix, mangle(&node.name, &param_tys))
        };
        node.name = mangled.clone();
        self.fn_decls.insert(
            mangled,
            FnDecl {
                node,
                scope: self.scope,
            },
        );
    }

    /// Compiles a function declaration. Functions without an explicit
    /// return type take the inference path; directive-carrying functions
    /// are post-processed after normal compilation.
    pub(crate) fn compile_fn(
        &mut self,
        node: &ast::FuncDecl,
        scope: u32,
    ) -> Option<TypedValue<'ctx>> {
        if !node.directives.is_empty() {
            return self.compile_directive_fn(node, scope);
        }

        let ret = match &node.ret {
            Some(t) => self.resolve_named(t),
            None => return self.compile_fn_inferred(node, scope),
        };

        let param_tys: Vec<Ty> = node
            .params
            .iter()
            .map(|(_, t)| self.resolve_named(t))
            .collect();
        let mut param_ltys = Vec::with_capacity(param_tys.len());
        for t in &param_tys {
            param_ltys.push(self.ty_to_llvm(t, node.loc)?);
        }
        let fn_llvm_ty = self.fn_type_for(&ret, &param_ltys, node.varargs, node.loc)?;

        let fn_ty = Ty::Func {
            ret: Box::new(ret.clone()),
            params: param_tys.clone(),
        };
        let name = if node.name.is_empty() {
            "__lambda__"
        } else {
            &node.name
        };
        let f = self.module.add_function(name, fn_llvm_ty, None);
        add_fn_attr(self.context, f, "nounwind");

        let ret_tv = TypedValue::function(f, fn_ty);
        if !node.name.is_empty() {
            self.sto_var(
                &node.name,
                Variable {
                    tval: ret_tv.clone(),
                    scope,
                    no_free: true,
                },
            );
        }

        // A declaration without a body stays extern.
        if let Some(body) = &node.body {
            let entry = self.context.append_basic_block(f, "entry");
            self.builder.position_at_end(entry);

            let old_scope = self.scope;
            let old_floor = self.fn_scope_floor;
            self.scope = self.var_table.len() as u32;
            self.fn_scope_floor = self.scope + 1;
            self.enter_new_scope();
            self.bind_params(f, &node.params, &param_tys);

            let v = self.lower_expr(body);

            self.exit_scope();
            self.scope = old_scope;
            self.fn_scope_floor = old_floor;

            let v = v?;
            if !self.block_terminated() {
                if ret == Ty::Unit {
                    self.builder.build_return(None).ok()?;
                } else {
                    if v.ty != ret {
                        return self.comp_err(
                            format!(
                                "function {} returned a value of type {} but was declared to return {}",
                                node.name, v.ty, ret
                            ),
                            node.loc,
                        );
                    }
                    self.builder.build_return(Some(&v.val)).ok()?;
                }
            }
        }

        Some(ret_tv)
    }

    /// The inferred-return path used by lambdas and named functions whose
    /// return type was omitted. The body is first lowered into a scratch
    /// void function to learn its result type, then compiled for real with
    /// that type. The second pass suppresses diagnostics so each error is
    /// reported once.
    pub(crate) fn compile_fn_inferred(
        &mut self,
        node: &ast::FuncDecl,
        scope: u32,
    ) -> Option<TypedValue<'ctx>> {
        // A body-less declaration with no return type stays an extern
        // declaration returning unit.
        let body = match node.body.as_deref() {
            Some(b) => b,
            None => {
                let mut ext = node.clone();
                ext.ret = Some(Ty::Unit);
                return self.compile_fn(&ext, scope);
            }
        };

        let caller = self.builder.get_insert_block();

        let param_tys: Vec<Ty> = node
            .params
            .iter()
            .map(|(_, t)| self.resolve_named(t))
            .collect();
        let mut param_ltys = Vec::with_capacity(param_tys.len());
        for t in &param_tys {
            param_ltys.push(self.ty_to_llvm(t, node.loc)?);
        }

        // Pass 1: scratch function, void return.
        let pre_ty = self.fn_type_for(&Ty::Unit, &param_ltys, node.varargs, node.loc)?;
        let pre_fn = self.module.add_function("__lambda_pre__", pre_ty, None);
        let entry = self.context.append_basic_block(pre_fn, "entry");
        self.builder.position_at_end(entry);

        let old_scope = self.scope;
        let old_floor = self.fn_scope_floor;
        self.scope = self.var_table.len() as u32;
        self.fn_scope_floor = self.scope + 1;
        self.enter_new_scope();
        self.bind_params(pre_fn, &node.params, &param_tys);

        let probe = self.lower_expr(body);

        self.exit_scope();
        self.scope = old_scope;
        self.fn_scope_floor = old_floor;

        let ret = match probe {
            Some(v) => v.ty,
            None => {
                unsafe { pre_fn.delete() };
                self.restore_block(caller);
                return None;
            }
        };
        unsafe { pre_fn.delete() };

        // Pass 2: the real function with the discovered return type.
        let real_ty = self.fn_type_for(&ret, &param_ltys, node.varargs, node.loc)?;
        let name = if node.name.is_empty() {
            "__lambda__"
        } else {
            &node.name
        };
        let f = self.module.add_function(name, real_ty, None);
        let entry = self.context.append_basic_block(f, "entry");
        self.builder.position_at_end(entry);

        let old_scope = self.scope;
        let old_floor = self.fn_scope_floor;
        self.scope = self.var_table.len() as u32;
        self.fn_scope_floor = self.scope + 1;
        self.enter_new_scope();
        self.bind_params(f, &node.params, &param_tys);

        let guard = diagnostics::suppress();
        let v = self.lower_expr(body);
        drop(guard);

        self.exit_scope();
        self.scope = old_scope;
        self.fn_scope_floor = old_floor;

        let v = v?;
        if !self.block_terminated() {
            if ret == Ty::Unit {
                self.builder.build_return(None).ok()?;
            } else {
                self.builder.build_return(Some(&v.val)).ok()?;
            }
        }

        let fn_ty = Ty::Func {
            ret: Box::new(ret),
            params: param_tys,
        };
        let ret_tv = TypedValue::function(f, fn_ty);
        if !node.name.is_empty() {
            self.sto_var(
                &node.name,
                Variable {
                    tval: ret_tv.clone(),
                    scope,
                    no_free: true,
                },
            );
        }

        self.restore_block(caller);
        Some(ret_tv)
    }

    /// Compiles a directive-carrying function, then applies each directive:
    /// `inline` marks the definition always-inline; `ct` recompiles it into
    /// a throwaway module and runs it under the JIT at compile time.
    fn compile_directive_fn(
        &mut self,
        node: &ast::FuncDecl,
        scope: u32,
    ) -> Option<TypedValue<'ctx>> {
        let mut plain = node.clone();
        plain.directives.clear();
        let compiled = self.compile_fn(&plain, scope)?;

        for directive in &node.directives {
            match directive.as_str() {
                "inline" => {
                    if let Some(f) = compiled.func {
                        add_fn_attr(self.context, f, "alwaysinline");
                    }
                }
                "ct" => {
                    let scratch = self.context.create_module("__ct__");
                    let saved_module = std::mem::replace(&mut self.module, scratch);
                    let saved_binding = self.lookup(&plain.name).cloned();

                    let caller = self.builder.get_insert_block();
                    let recompiled = self.compile_fn(&plain, scope);
                    self.restore_block(caller);

                    let scratch = std::mem::replace(&mut self.module, saved_module);
                    if let Some(rec) = recompiled {
                        if let Some(f) = rec.func {
                            jit_invoke(&scratch, f);
                        }
                    }
                    // The binding must point at the definition in the real
                    // module, not the throwaway one.
                    if let Some(var) = saved_binding {
                        self.sto_var(&plain.name, var);
                    }
                }
                other => {
                    return self.comp_err(
                        format!("unrecognized compiler directive '{}'", other),
                        node.loc,
                    )
                }
            }
        }

        Some(compiled)
    }

    fn bind_params(&mut self, f: FunctionValue<'ctx>, params: &[(String, Ty)], tys: &[Ty]) {
        for (i, (name, _)) in params.iter().enumerate() {
            if let (Some(arg), Some(ty)) = (f.get_nth_param(i as u32), tys.get(i)) {
                let scope = self.scope;
                self.sto_var(
                    name,
                    Variable {
                        tval: TypedValue::new(arg, ty.clone()),
                        scope,
                        no_free: true,
                    },
                );
            }
        }
    }

    fn restore_block(&mut self, bb: Option<inkwell::basic_block::BasicBlock<'ctx>>) {
        match bb {
            Some(bb) => self.builder.position_at_end(bb),
            None => self.builder.clear_insertion_position(),
        }
    }

    /// Call lowering. Unit-typed arguments vanish (so `f()` applies zero
    /// arguments); a bare identifier callee first tries method resolution
    /// against the first argument's type; method values prepend their
    /// receiver; each argument is checked by nominal equality against the
    /// parameter type, with numeric widening and `<ParamT>_Cast` search as
    /// fallbacks.
    pub(crate) fn lower_call(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        loc: Loc,
    ) -> Option<TypedValue<'ctx>> {
        let mut typed_args = Vec::with_capacity(args.len());
        for a in args {
            let tv = self.lower_expr(a)?;
            if tv.ty != Ty::Unit {
                typed_args.push(tv);
            }
        }

        // Method-call inference: `len(s)` resolves to `Str_len` when the
        // first argument's type exposes it.
        let mut tvf = None;
        if let Expr::Var { name, .. } = callee {
            if let Some(first) = typed_args.first() {
                let method_name = format!("{}_{}", first.ty, name);
                tvf = self.get_function(&method_name);
            }
        }
        let tvf = match tvf {
            Some(f) => f,
            None => self.lower_expr(callee)?,
        };

        let (ret_ty, param_tys, is_method) = match &tvf.ty {
            Ty::Func { ret, params } => ((**ret).clone(), params.clone(), false),
            Ty::Method { ret, params } => ((**ret).clone(), params.clone(), true),
            other => {
                return self.comp_err(
                    format!(
                        "called value is not a function or method, it is a(n) {}",
                        other
                    ),
                    callee.loc(),
                )
            }
        };
        let f = match tvf.func {
            Some(f) => f,
            None => {
                return self.comp_err("called value is not a known function", callee.loc());
            }
        };

        if is_method {
            if let Some(receiver) = tvf.receiver.clone() {
                typed_args.insert(0, *receiver);
            }
        }

        if f.count_params() as usize != typed_args.len() && !f.get_type().is_var_arg() {
            return self.comp_err(
                format!(
                    "called function was given {} argument{} but was declared to take {}",
                    typed_args.len(),
                    if typed_args.len() == 1 { "" } else { "s" },
                    f.count_params()
                ),
                loc,
            );
        }

        let mut call_args: Vec<BasicMetadataValueEnum<'ctx>> = Vec::with_capacity(typed_args.len());
        for (i, arg) in typed_args.iter().enumerate() {
            let param_ty = match param_tys.get(i) {
                Some(t) => self.resolve_named(t),
                None => {
                    // Varargs tail: pass through unchecked.
                    call_args.push(arg.val.into());
                    continue;
                }
            };
            if arg.ty == param_ty {
                call_args.push(arg.val.into());
                continue;
            }

            // Numeric widening first.
            if arg.ty.is_numeric() && param_ty.is_numeric() {
                let widened = self.implicitly_widen_num(arg.clone(), &param_ty);
                if widened.ty == param_ty {
                    call_args.push(widened.val.into());
                    continue;
                }
            }

            // Then a user-provided cast function, with a direct extraction
            // for the common Str -> [c8] case.
            let cast_base = format!("{}_Cast", param_ty);
            if let Some(cf) = self.get_mangled_function(&cast_base, &[arg.ty.clone()]) {
                if arg.ty == Ty::Data("Str".to_string()) && cast_base == "[c8]_Cast" {
                    let v = self
                        .builder
                        .build_extract_value(arg.val.into_struct_value(), 0, "cstr")
                        .ok()?;
                    call_args.push(v.into());
                } else {
                    let cfn = cf.func?;
                    let call = self
                        .builder
                        .build_call(cfn, &[arg.val.into()], "argcast")
                        .ok()?;
                    let v = call.try_as_basic_value().left()?;
                    call_args.push(v.into());
                }
                continue;
            }

            return self.comp_err(
                format!(
                    "argument {} of function is a(n) {} but was declared to be a(n) {}",
                    i + 1,
                    arg.ty,
                    param_ty
                ),
                loc,
            );
        }

        let call = self.builder.build_call(f, &call_args, "call").ok()?;
        let v = call
            .try_as_basic_value()
            .left()
            .unwrap_or_else(|| self.void_literal().val);
        Some(TypedValue::new(v, ret_ty))
    }
}

fn add_fn_attr<'ctx>(
    context: &'ctx inkwell::context::Context,
    f: FunctionValue<'ctx>,
    name: &str,
) {
    let kind = Attribute::get_named_enum_kind_id(name);
    if kind > 0 {
        f.add_attribute(AttributeLoc::Function, context.create_enum_attribute(kind, 0));
    }
}

/// Runs a just-compiled function in a throwaway JIT session; used by the
/// `![ct]` compile-time execution directive.
fn jit_invoke<'ctx>(module: &Module<'ctx>, f: FunctionValue<'ctx>) {
    let name = match f.get_name().to_str() {
        Ok(n) => n.to_string(),
        Err(_) => return,
    };
    match module.create_jit_execution_engine(OptimizationLevel::None) {
        Ok(engine) => unsafe {
            if let Ok(compiled) = engine.get_function::<unsafe extern "C" fn()>(&name) {
                compiled.call();
            }
        },
        Err(e) => {
            diagnostics::report_note(&format!("compile-time execution failed: {}", e));
        }
    }
}
