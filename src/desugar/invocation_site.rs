//! Retargeting of field accesses, method invocations and lambda implementation handles to the
//! members moved into companion classes.
//!
//! Instructions are patched in place. A moved method is always static, so every retargeted
//! invocation becomes `invokestatic`; an `invokeinterface` keeps its length by padding the two
//! trailing operand bytes with `nop`. Code offsets therefore never change.

use std::collections::BTreeSet;

use tracing::trace;

use super::{
    Analysis, DesugarError,
    helpers::{LAMBDA_METAFACTORY, bootstrap_methods},
};
use crate::jvm::bytecode::{
    ClassFile, ConstantPool,
    attributes::{AttributeInfo, Code, names},
    constant_pool::Entry,
    instruction::{self, InstructionKind, InvokeKind, opcodes},
};

/// `REF_invokeStatic`
const REF_INVOKE_STATIC: u8 = 6;

const METAFACTORY: &str = "metafactory";

/// Rewrites every reference to a moved member.
///
/// Method invocations are only retargeted if their owner is in `retargeting_owners`; `None`
/// allows any owner. Field accesses are always retargeted.
///
/// Lambda implementation handles are retargeted for `LambdaMetafactory.metafactory` call sites
/// regardless of `retargeting_owners`, since they only name synthetic methods of the class
/// itself. Handles passed to `altMetafactory` keep pointing at the class: it still has the
/// implementation method, and serializable lambdas resolve it by name in `$deserializeLambda$`.
/// # Errors
/// Returns [`DesugarError`] if the class is malformed or the constant pool overflows.
pub fn replace_invocation_sites(
    class_file: &mut ClassFile,
    analysis: &Analysis,
    retargeting_owners: Option<&BTreeSet<String>>,
) -> Result<(), DesugarError> {
    let bootstraps = bootstrap_methods(class_file)?;
    let ClassFile {
        constant_pool,
        methods,
        attributes,
        ..
    } = class_file;
    for method in methods.iter_mut() {
        for attribute in &mut method.attributes {
            if attribute.name(constant_pool)? != names::CODE {
                continue;
            }
            let mut code: Code = attribute.decode()?;
            if rewrite_code(&mut code.code, constant_pool, analysis, retargeting_owners)? {
                *attribute = AttributeInfo::encode(attribute.name_index, &code)?;
            }
        }
    }

    let mut bootstraps = bootstraps;
    let mut bootstraps_changed = false;
    for bootstrap in &mut bootstraps {
        let (_, factory) = constant_pool.get_method_handle(bootstrap.method_ref_index)?;
        if factory.owner() != LAMBDA_METAFACTORY || factory.name() != METAFACTORY {
            continue;
        }
        let Some(&implementation_index) = bootstrap.arguments.get(1) else {
            continue;
        };
        if !matches!(
            constant_pool.get_entry(implementation_index)?,
            Entry::MethodHandle { .. }
        ) {
            continue;
        }
        let (_, implementation) = constant_pool.get_method_handle(implementation_index)?;
        if let Some(replacement) = analysis.replacement_method(&implementation) {
            trace!(lambda = %implementation, replacement = %replacement, "Retargeting lambda");
            let reference = constant_pool.put_method_ref(replacement, false)?;
            bootstrap.arguments[1] = constant_pool.put_method_handle(REF_INVOKE_STATIC, reference)?;
            bootstraps_changed = true;
        }
    }
    if bootstraps_changed {
        for attribute in attributes.iter_mut() {
            if attribute.name(constant_pool)? == names::BOOTSTRAP_METHODS {
                *attribute = AttributeInfo::encode(attribute.name_index, &bootstraps)?;
            }
        }
    }
    Ok(())
}

/// Patches the references in a code array. Returns whether anything changed.
fn rewrite_code(
    code: &mut [u8],
    constant_pool: &mut ConstantPool,
    analysis: &Analysis,
    retargeting_owners: Option<&BTreeSet<String>>,
) -> Result<bool, DesugarError> {
    let mut changed = false;
    for insn in instruction::decode(code)? {
        let operand = insn.operand_pc();
        match insn.kind {
            InstructionKind::FieldAccess { index, .. } => {
                let field = constant_pool.get_member_key(index)?;
                if let Some(replacement) = analysis.replacement_field(&field) {
                    trace!(pc = insn.pc, field = %field, replacement = %replacement, "Retargeting field access");
                    let new_index = constant_pool.put_field_ref(replacement)?;
                    code[operand..operand + 2].copy_from_slice(&new_index.to_be_bytes());
                    changed = true;
                }
            }
            InstructionKind::Invoke { kind, index } => {
                let method = constant_pool.get_member_key(index)?;
                let eligible =
                    retargeting_owners.is_none_or(|owners| owners.contains(method.owner()));
                let Some(replacement) = analysis.replacement_method(&method).filter(|_| eligible)
                else {
                    continue;
                };
                trace!(pc = insn.pc, method = %method, replacement = %replacement, "Retargeting invocation");
                let new_index = constant_pool.put_method_ref(replacement, false)?;
                code[insn.pc] = InvokeKind::Static.opcode();
                code[operand..operand + 2].copy_from_slice(&new_index.to_be_bytes());
                if kind == InvokeKind::Interface {
                    code[operand + 2] = opcodes::NOP;
                    code[operand + 3] = opcodes::NOP;
                }
                changed = true;
            }
            InstructionKind::InvokeDynamic { .. } | InstructionKind::Other => {}
        }
    }
    Ok(changed)
}
