//! Type mapping and small IR utilities shared by the lowering phases.

use inkwell::types::{BasicType, BasicTypeEnum};
use inkwell::values::{BasicValueEnum, InstructionOpcode, InstructionValue, PointerValue};
use inkwell::AddressSpace;

use crate::ast::Loc;
use crate::compiler::{Compiler, TypedValue};
use crate::types::Ty;

impl<'ctx> Compiler<'ctx> {
    /// Maps a source type to its backend type. Tuples lower to anonymous
    /// structures preserving field order; pointers, arrays (which decay to
    /// a pointer to their first element), and functions all lower to the
    /// opaque pointer type; named types resolve through the registry.
    pub fn ty_to_llvm(&mut self, ty: &Ty, loc: Loc) -> Option<BasicTypeEnum<'ctx>> {
        let t = match ty {
            Ty::I8 | Ty::U8 | Ty::C8 => self.context.i8_type().into(),
            Ty::I16 | Ty::U16 => self.context.i16_type().into(),
            Ty::I32 | Ty::U32 => self.context.i32_type().into(),
            Ty::I64 | Ty::U64 | Ty::Isz | Ty::Usz => self.context.i64_type().into(),
            Ty::F16 => self.context.f16_type().into(),
            Ty::F32 => self.context.f32_type().into(),
            Ty::F64 => self.context.f64_type().into(),
            Ty::Bool => self.context.bool_type().into(),
            Ty::Unit => self.context.struct_type(&[], false).into(),
            Ty::Ptr(_) | Ty::Array(_) | Ty::Func { .. } | Ty::Method { .. } => {
                self.context.i8_type().ptr_type(AddressSpace::default()).into()
            }
            Ty::Tuple(elems) => {
                let mut fields = Vec::with_capacity(elems.len());
                for e in elems {
                    fields.push(self.ty_to_llvm(e, loc)?);
                }
                self.context.struct_type(&fields, false).into()
            }
            Ty::Data(name) | Ty::Union(name) => {
                let layout = match self.lookup_type(name) {
                    Some(dt) => dt.ty.clone(),
                    None => {
                        self.comp_err(format!("use of undeclared type {}", name), loc);
                        return None;
                    }
                };
                self.ty_to_llvm(&layout, loc)?
            }
        };
        Some(t)
    }

    /// Size of a value of this type in bits. Pointers, arrays, and
    /// functions take a machine word; aggregates sum their fields, so a
    /// tagged union reports `8 + bits(largest variant)` through its stored
    /// layout. Fails on undeclared named types.
    pub fn size_in_bits(&mut self, ty: &Ty, loc: Loc) -> Option<u64> {
        match ty {
            Ty::Ptr(_) | Ty::Array(_) | Ty::Func { .. } | Ty::Method { .. } => Some(64),
            Ty::Tuple(elems) => {
                let mut sum = 0;
                for e in elems {
                    sum += self.size_in_bits(e, loc)?;
                }
                Some(sum)
            }
            Ty::Data(name) | Ty::Union(name) => {
                let layout = match self.lookup_type(name) {
                    Some(dt) => dt.ty.clone(),
                    None => {
                        self.comp_err(format!("use of undeclared type {}", name), loc);
                        return None;
                    }
                };
                self.size_in_bits(&layout, loc)
            }
            Ty::Unit => Some(0),
            prim => Some(prim.primitive_width() as u64),
        }
    }

    /// The unit value: an empty anonymous structure.
    pub fn void_literal(&self) -> TypedValue<'ctx> {
        let v = self.context.const_struct(&[], false);
        TypedValue::new(v.into(), Ty::Unit)
    }

    pub fn bool_literal(&self, val: bool) -> TypedValue<'ctx> {
        let v = self.context.bool_type().const_int(val as u64, false);
        TypedValue::new(v.into(), Ty::Bool)
    }

    pub fn char_literal(&self, val: u8) -> TypedValue<'ctx> {
        let v = self.context.i8_type().const_int(val as u64, false);
        TypedValue::new(v.into(), Ty::C8)
    }

    /// True when the current insertion block already ends in a terminator;
    /// used to avoid emitting successor branches after a `return`.
    pub fn block_terminated(&self) -> bool {
        self.builder
            .get_insert_block()
            .map_or(false, |bb| bb.get_terminator().is_some())
    }

    /// Branch to `bb` unless the current block already has a terminator.
    pub fn branch_unless_terminated(&self, bb: inkwell::basic_block::BasicBlock<'ctx>) {
        if !self.block_terminated() {
            let _ = self.builder.build_unconditional_branch(bb);
        }
    }
}

fn as_instruction(val: BasicValueEnum) -> Option<InstructionValue> {
    match val {
        BasicValueEnum::IntValue(v) => v.as_instruction(),
        BasicValueEnum::FloatValue(v) => v.as_instruction(),
        BasicValueEnum::PointerValue(v) => v.as_instruction(),
        BasicValueEnum::StructValue(v) => v.as_instruction(),
        BasicValueEnum::ArrayValue(v) => v.as_instruction(),
        BasicValueEnum::VectorValue(v) => v.as_instruction(),
        BasicValueEnum::ScalableVectorValue(v) => v.as_instruction(),
    }
}

/// True when the value is a stack slot produced by `alloca`.
pub fn is_alloca(val: BasicValueEnum) -> bool {
    as_instruction(val).map_or(false, |i| i.get_opcode() == InstructionOpcode::Alloca)
}

/// If the value originates from a load of a stack slot, returns the slot's
/// address. This is the mutability test: assignment and indexed insertion
/// require their target to load from somewhere storable.
pub fn load_source<'ctx>(val: BasicValueEnum<'ctx>) -> Option<PointerValue<'ctx>> {
    let inst = as_instruction(val)?;
    if inst.get_opcode() != InstructionOpcode::Load {
        return None;
    }
    match inst.get_operand(0) {
        Some(either) => either.left().and_then(|v| {
            if v.is_pointer_value() {
                Some(v.into_pointer_value())
            } else {
                None
            }
        }),
        None => None,
    }
}

/// Conservative constness test used when assembling aggregate literals:
/// scalar constants are recognized, everything else is inserted dynamically.
pub fn is_const_value(val: BasicValueEnum) -> bool {
    match val {
        BasicValueEnum::IntValue(v) => v.is_const(),
        BasicValueEnum::FloatValue(v) => v.is_const(),
        BasicValueEnum::PointerValue(v) => v.is_const(),
        _ => false,
    }
}

/// An undef placeholder of the given type.
pub fn undef_of(ty: BasicTypeEnum) -> BasicValueEnum {
    match ty {
        BasicTypeEnum::IntType(t) => t.get_undef().into(),
        BasicTypeEnum::FloatType(t) => t.get_undef().into(),
        BasicTypeEnum::PointerType(t) => t.get_undef().into(),
        BasicTypeEnum::StructType(t) => t.get_undef().into(),
        BasicTypeEnum::ArrayType(t) => t.get_undef().into(),
        BasicTypeEnum::VectorType(t) => t.get_undef().into(),
        BasicTypeEnum::ScalableVectorType(t) => t.get_undef().into(),
    }
}

/// Structural equivalence of two values' backend types. LLVM interns types
/// within a context, so comparing the wrappers is exact.
pub fn llvm_ty_eq(a: BasicValueEnum, b: BasicValueEnum) -> bool {
    a.get_type() == b.get_type()
}

impl<'ctx> Compiler<'ctx> {
    /// Lowers a function signature to the backend function type, mapping a
    /// `Unit` return to `void`.
    pub fn fn_type_for(
        &mut self,
        ret: &Ty,
        params: &[BasicTypeEnum<'ctx>],
        varargs: bool,
        loc: Loc,
    ) -> Option<inkwell::types::FunctionType<'ctx>> {
        let args: Vec<inkwell::types::BasicMetadataTypeEnum<'ctx>> =
            params.iter().map(|&t| t.into()).collect();
        if *ret == Ty::Unit {
            Some(self.context.void_type().fn_type(&args, varargs))
        } else {
            let rt = self.ty_to_llvm(ret, loc)?;
            Some(rt.fn_type(&args, varargs))
        }
    }
}
