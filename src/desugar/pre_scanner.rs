use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tracing::{debug, trace};

use super::{
    DesugarError,
    helpers::{
        bootstrap_methods, has_any_annotation, is_covariant_return_typed_method, lambda_bootstrap,
        lambda_implementation, replacement_field_key, replacement_method_key,
    },
};
use crate::jvm::{
    ClassMemberKey,
    access_flags::{FieldAccessFlags, MethodAccessFlags},
    bytecode::{
        ClassFile, MethodInfo,
        instruction::{self, InstructionKind},
    },
};

/// A preliminary pass over the classes of an archive that finds every member to be moved into a
/// companion class.
///
/// Members carrying one of the supported-API annotations are the seeds. From there the scanner
/// follows field accesses, method invocations and lambda implementation handles in the bodies of
/// the methods to move, and collects the non-public members of the same class they depend on.
#[derive(Debug, Default)]
pub struct PreScanner {
    supported_api_annotations: BTreeSet<String>,
    type_replacements: BTreeMap<String, String>,
    field_replacements: BTreeMap<ClassMemberKey, ClassMemberKey>,
    method_replacements: BTreeMap<ClassMemberKey, ClassMemberKey>,
}

/// The non-public members of the class being scanned and the BFS frontier.
struct ClassScan<'c> {
    non_public_fields: BTreeSet<ClassMemberKey>,
    non_public_methods: BTreeMap<ClassMemberKey, &'c MethodInfo>,
    staging_methods: VecDeque<ClassMemberKey>,
    staging_methods_map: BTreeMap<ClassMemberKey, &'c MethodInfo>,
}

impl<'c> ClassScan<'c> {
    fn stage(&mut self, key: ClassMemberKey, method: &'c MethodInfo) {
        if !self.staging_methods_map.contains_key(&key) {
            self.staging_methods.push_back(key.clone());
            self.staging_methods_map.insert(key, method);
        }
    }

    /// Stages `target` if it is a non-public method of this class that is not yet moved.
    fn stage_dependency(
        &mut self,
        target: ClassMemberKey,
        method_replacements: &BTreeMap<ClassMemberKey, ClassMemberKey>,
    ) {
        if method_replacements.contains_key(&target) {
            return;
        }
        if let Some(&method) = self.non_public_methods.get(&target) {
            self.stage(target, method);
        }
    }
}

impl PreScanner {
    /// Creates a scanner seeding from members annotated with any of `supported_api_annotations`,
    /// given as internal names.
    #[must_use]
    pub fn new(supported_api_annotations: BTreeSet<String>) -> Self {
        Self {
            supported_api_annotations,
            ..Self::default()
        }
    }

    /// Sets the type substitutions reported by [`Analysis::replacement_type`].
    #[must_use]
    pub fn with_type_replacements(mut self, type_replacements: BTreeMap<String, String>) -> Self {
        self.type_replacements = type_replacements;
        self
    }

    /// Scans one class and records the replacements of its members.
    ///
    /// The result does not depend on the order in which classes are scanned, since a class only
    /// ever contributes replacements for its own members.
    /// # Errors
    /// - [`DesugarError::NonConstantSupportedField`] if an annotated field is not `static final`.
    /// - [`DesugarError::Parse`] and friends if the class file is malformed.
    pub fn scan(&mut self, class_file: &ClassFile) -> Result<(), DesugarError> {
        let constant_pool = &class_file.constant_pool;
        let owner = class_file.this_class_name()?;
        let mut scan = ClassScan {
            non_public_fields: BTreeSet::new(),
            non_public_methods: BTreeMap::new(),
            staging_methods: VecDeque::new(),
            staging_methods_map: BTreeMap::new(),
        };

        for field in &class_file.fields {
            let key = field.key(owner, constant_pool)?;
            if has_any_annotation(
                &field.attributes,
                constant_pool,
                &self.supported_api_annotations,
            )? {
                if !field
                    .access_flags
                    .contains(FieldAccessFlags::STATIC | FieldAccessFlags::FINAL)
                {
                    return Err(DesugarError::NonConstantSupportedField(key));
                }
                self.add_field_replacement(&key);
            }
            if field.is_static() && !field.access_flags.contains(FieldAccessFlags::PUBLIC) {
                scan.non_public_fields.insert(key);
            }
        }

        for method in &class_file.methods {
            let key = method.key(owner, constant_pool)?;
            if has_any_annotation(
                &method.attributes,
                constant_pool,
                &self.supported_api_annotations,
            )? && !is_covariant_return_typed_method(&key)
            {
                scan.stage(key.clone(), method);
            }
            if key.name() != "<init>" && !method.access_flags.contains(MethodAccessFlags::PUBLIC) {
                scan.non_public_methods.insert(key, method);
            }
        }

        if scan.staging_methods.is_empty() {
            return Ok(());
        }
        let bootstrap_methods = bootstrap_methods(class_file)?;
        while let Some(key) = scan.staging_methods.pop_front() {
            let Some(&method) = scan.staging_methods_map.get(&key) else {
                continue;
            };
            if self.method_replacements.contains_key(&key) {
                continue;
            }
            let replacement = replacement_method_key(method.is_static(), &key)?;
            debug!(method = %key, replacement = %replacement, "Found method replacement");
            self.method_replacements.insert(key, replacement);

            // Abstract and native methods are rejected when the companion is generated.
            let Some(code) = method.code(constant_pool)? else {
                continue;
            };
            for insn in instruction::decode(&code.code)? {
                match insn.kind {
                    InstructionKind::FieldAccess { index, .. } => {
                        let target = constant_pool.get_member_key(index)?;
                        if scan.non_public_fields.contains(&target) {
                            self.add_field_replacement(&target);
                        }
                    }
                    InstructionKind::Invoke { index, .. } => {
                        let target = constant_pool.get_member_key(index)?;
                        scan.stage_dependency(target, &self.method_replacements);
                    }
                    InstructionKind::InvokeDynamic { index } => {
                        let Some((_, bootstrap)) =
                            lambda_bootstrap(constant_pool, &bootstrap_methods, index)?
                        else {
                            continue;
                        };
                        if let Some(target) = lambda_implementation(constant_pool, bootstrap)? {
                            scan.stage_dependency(target, &self.method_replacements);
                        }
                    }
                    InstructionKind::Other => {}
                }
            }
        }
        Ok(())
    }

    fn add_field_replacement(&mut self, key: &ClassMemberKey) {
        if !self.field_replacements.contains_key(key) {
            let replacement = replacement_field_key(key);
            trace!(field = %key, replacement = %replacement, "Found field replacement");
            self.field_replacements.insert(key.clone(), replacement);
        }
    }

    /// The replacement of a method, if it is moved.
    #[must_use]
    pub fn replacement_method(&self, key: &ClassMemberKey) -> Option<&ClassMemberKey> {
        self.method_replacements.get(key)
    }

    /// The replacement of a field, if it is moved.
    #[must_use]
    pub fn replacement_field(&self, key: &ClassMemberKey) -> Option<&ClassMemberKey> {
        self.field_replacements.get(key)
    }

    /// Finishes the scan and hands out the replacement maps.
    #[must_use]
    pub fn finish(self) -> Analysis {
        Analysis {
            field_replacements: self.field_replacements,
            method_replacements: self.method_replacements,
            type_replacements: self.type_replacements,
        }
    }
}

/// The result of scanning every class of an archive. Read-only for the rest of the run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Analysis {
    field_replacements: BTreeMap<ClassMemberKey, ClassMemberKey>,
    method_replacements: BTreeMap<ClassMemberKey, ClassMemberKey>,
    type_replacements: BTreeMap<String, String>,
}

impl Analysis {
    /// The replacement of a method, if it is moved.
    #[must_use]
    pub fn replacement_method(&self, key: &ClassMemberKey) -> Option<&ClassMemberKey> {
        self.method_replacements.get(key)
    }

    /// The replacement of a field, if it is moved.
    #[must_use]
    pub fn replacement_field(&self, key: &ClassMemberKey) -> Option<&ClassMemberKey> {
        self.field_replacements.get(key)
    }

    /// The substitute of a type, following chained substitutions. A name whose chain runs into
    /// a cycle has no substitute.
    #[must_use]
    pub fn replacement_type(&self, type_name: &str) -> Option<String> {
        let mut current = self.type_replacements.get(type_name)?;
        let mut seen = BTreeSet::from([type_name]);
        loop {
            if !seen.insert(current.as_str()) {
                return None;
            }
            match self.type_replacements.get(current.as_str()) {
                Some(next) => current = next,
                None => return Some(current.clone()),
            }
        }
    }

    /// Checks if any type substitution is configured.
    #[must_use]
    pub fn has_type_replacements(&self) -> bool {
        !self.type_replacements.is_empty()
    }

    /// All method replacements.
    pub fn method_replacements(
        &self,
    ) -> impl Iterator<Item = (&ClassMemberKey, &ClassMemberKey)> {
        self.method_replacements.iter()
    }

    /// All field replacements.
    pub fn field_replacements(&self) -> impl Iterator<Item = (&ClassMemberKey, &ClassMemberKey)> {
        self.field_replacements.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{ClassBuilder, insn};

    const API: &str = "pkg/Api";

    fn scanner() -> PreScanner {
        PreScanner::new(BTreeSet::from([API.to_owned()]))
    }

    fn key(owner: &str, name: &str, descriptor: &str) -> ClassMemberKey {
        ClassMemberKey::create(owner, name, descriptor)
    }

    /// `m()` calls `p()`, which reads `f`; `unused()` reads `g`.
    fn closure_class() -> ClassFile {
        let mut builder = ClassBuilder::new("pkg/C");
        let p = builder.method_ref("pkg/C", "p", "()I");
        let f = builder.field_ref("pkg/C", "f", "I");
        let g = builder.field_ref("pkg/C", "g", "I");
        let bytes = builder
            .field(FieldAccessFlags::PRIVATE | FieldAccessFlags::STATIC, "f", "I")
            .field(FieldAccessFlags::PRIVATE | FieldAccessFlags::STATIC, "g", "I")
            .method(
                MethodAccessFlags::PUBLIC,
                "m",
                "()I",
                &[&[0x2a][..], &insn(0xb7, p), &[0xac]].concat(),
            )
            .annotation(API)
            .method(MethodAccessFlags::PRIVATE, "p", "()I", &[&insn(0xb2, f)[..], &[0xac]].concat())
            .method(
                MethodAccessFlags::PRIVATE | MethodAccessFlags::STATIC,
                "unused",
                "()I",
                &[&insn(0xb2, g)[..], &[0xac]].concat(),
            )
            .build();
        ClassFile::from_bytes(&bytes).unwrap()
    }

    #[test]
    fn closure_is_complete() {
        let mut scanner = scanner();
        scanner.scan(&closure_class()).unwrap();
        assert_eq!(
            scanner.replacement_method(&key("pkg/C", "m", "()I")),
            Some(&key("pkg/DesugarC", "m", "(Lpkg/C;)I"))
        );
        assert_eq!(
            scanner.replacement_method(&key("pkg/C", "p", "()I")),
            Some(&key("pkg/DesugarC", "p", "(Lpkg/C;)I"))
        );
        assert_eq!(
            scanner.replacement_field(&key("pkg/C", "f", "I")),
            Some(&key("pkg/DesugarC", "f", "I"))
        );
    }

    #[test]
    fn no_spurious_replacements() {
        let mut scanner = scanner();
        scanner.scan(&closure_class()).unwrap();
        assert_eq!(scanner.replacement_method(&key("pkg/C", "unused", "()I")), None);
        assert_eq!(scanner.replacement_field(&key("pkg/C", "g", "I")), None);
        let analysis = scanner.finish();
        assert_eq!(analysis.method_replacements().count(), 2);
        assert_eq!(analysis.field_replacements().count(), 1);
    }

    #[test]
    fn cycles_terminate() {
        let mut builder = ClassBuilder::new("pkg/C");
        let a = builder.method_ref("pkg/C", "a", "()V");
        let b = builder.method_ref("pkg/C", "b", "()V");
        let bytes = builder
            .method(
                MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
                "entry",
                "()V",
                &[&insn(0xb8, a)[..], &[0xb1]].concat(),
            )
            .annotation(API)
            .method(
                MethodAccessFlags::PRIVATE | MethodAccessFlags::STATIC,
                "a",
                "()V",
                &[&insn(0xb8, b)[..], &[0xb1]].concat(),
            )
            .method(
                MethodAccessFlags::PRIVATE | MethodAccessFlags::STATIC,
                "b",
                "()V",
                &[&insn(0xb8, a)[..], &insn(0xb8, b), &[0xb1]].concat(),
            )
            .build();
        let mut scanner = scanner();
        scanner.scan(&ClassFile::from_bytes(&bytes).unwrap()).unwrap();
        let moved = scanner
            .finish()
            .method_replacements()
            .map(|(it, _)| it.name().to_owned())
            .collect::<Vec<_>>();
        assert_eq!(moved, ["a", "b", "entry"]);
    }

    #[test]
    fn lambda_implementation_is_followed() {
        let mut builder = ClassBuilder::new("pkg/C");
        let indy = builder.lambda("pkg/C", "lambda$m$0", "()V");
        let bytes = builder
            .method(
                MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
                "m",
                "()Ljava/lang/Runnable;",
                &[&[0xba][..], &indy.to_be_bytes(), &[0x00, 0x00, 0xb0]].concat(),
            )
            .annotation(API)
            .method(
                MethodAccessFlags::PRIVATE | MethodAccessFlags::STATIC | MethodAccessFlags::SYNTHETIC,
                "lambda$m$0",
                "()V",
                &[0xb1],
            )
            .build();
        let mut scanner = scanner();
        scanner.scan(&ClassFile::from_bytes(&bytes).unwrap()).unwrap();
        assert_eq!(
            scanner.replacement_method(&key("pkg/C", "lambda$m$0", "()V")),
            Some(&key("pkg/DesugarC", "lambda$m$0", "()V"))
        );
    }

    #[test]
    fn covariant_buffer_methods_are_not_seeds() {
        let bytes = ClassBuilder::new("java/nio/ByteBuffer")
            .method(MethodAccessFlags::PUBLIC, "flip", "()Ljava/nio/ByteBuffer;", &[0x2a, 0xb0])
            .annotation(API)
            .method(MethodAccessFlags::PUBLIC, "get", "()B", &[0x03, 0xac])
            .annotation(API)
            .build();
        let mut scanner = scanner();
        scanner.scan(&ClassFile::from_bytes(&bytes).unwrap()).unwrap();
        let analysis = scanner.finish();
        let moved = analysis
            .method_replacements()
            .map(|(it, _)| it.name())
            .collect::<Vec<_>>();
        assert_eq!(moved, ["get"]);
    }

    #[test]
    fn supported_field_must_be_constant() {
        let bytes = ClassBuilder::new("pkg/C")
            .field(FieldAccessFlags::PUBLIC | FieldAccessFlags::STATIC, "X", "I")
            .annotation(API)
            .build();
        let result = scanner().scan(&ClassFile::from_bytes(&bytes).unwrap());
        assert!(matches!(
            result,
            Err(DesugarError::NonConstantSupportedField(it)) if it == key("pkg/C", "X", "I")
        ));
    }

    #[test]
    fn scan_order_does_not_matter() {
        let other = ClassBuilder::new("pkg/D")
            .method(MethodAccessFlags::PUBLIC, "n", "()V", &[0xb1])
            .annotation(API)
            .build();
        let other = ClassFile::from_bytes(&other).unwrap();
        let closure = closure_class();

        let mut forward = scanner();
        forward.scan(&closure).unwrap();
        forward.scan(&other).unwrap();
        let mut backward = scanner();
        backward.scan(&other).unwrap();
        backward.scan(&closure).unwrap();
        assert_eq!(forward.finish(), backward.finish());
    }

    #[test]
    fn chained_type_replacements() {
        let analysis = PreScanner::default()
            .with_type_replacements(BTreeMap::from([
                ("a/A".to_owned(), "b/B".to_owned()),
                ("b/B".to_owned(), "c/C".to_owned()),
            ]))
            .finish();
        assert_eq!(analysis.replacement_type("a/A").as_deref(), Some("c/C"));
        assert_eq!(analysis.replacement_type("b/B").as_deref(), Some("c/C"));
        assert_eq!(analysis.replacement_type("c/C"), None);
    }

    #[test]
    fn cyclic_type_replacements_have_no_substitute() {
        let analysis = PreScanner::default()
            .with_type_replacements(BTreeMap::from([
                ("x/X".to_owned(), "y/Y".to_owned()),
                ("y/Y".to_owned(), "x/X".to_owned()),
                ("s/S".to_owned(), "s/S".to_owned()),
                ("a/A".to_owned(), "x/X".to_owned()),
            ]))
            .finish();
        assert_eq!(analysis.replacement_type("x/X"), None);
        assert_eq!(analysis.replacement_type("y/Y"), None);
        assert_eq!(analysis.replacement_type("s/S"), None);
        assert_eq!(analysis.replacement_type("a/A"), None);
        assert!(analysis.has_type_replacements());
    }
}
