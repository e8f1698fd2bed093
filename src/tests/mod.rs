use proptest::prelude::*;

use crate::{
    desugar::helpers::LAMBDA_METAFACTORY,
    jvm::{
        ClassMemberKey,
        access_flags::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags},
        bytecode::{
            ClassFile, ConstantPool, FieldInfo, MethodInfo, ToWriter,
            attributes::{Annotation, AttributeInfo, BootstrapMethod, Code, names},
            constant_pool::Entry,
        },
    },
    types::field_type::{FieldType, PrimitiveType},
};

pub(crate) fn arb_class_name() -> impl Strategy<Value = String> {
    let arb_ident = prop::string::string_regex(r"[a-zA-Z][\w\$_]*").expect("The regex is invalid");
    prop::collection::vec(arb_ident, 1..6).prop_map(|v| v.join("/"))
}

fn arb_primitive_type() -> impl Strategy<Value = PrimitiveType> {
    prop_oneof![
        Just(PrimitiveType::Boolean),
        Just(PrimitiveType::Char),
        Just(PrimitiveType::Float),
        Just(PrimitiveType::Double),
        Just(PrimitiveType::Byte),
        Just(PrimitiveType::Short),
        Just(PrimitiveType::Int),
        Just(PrimitiveType::Long),
    ]
}

pub(crate) fn arb_non_array_field_type() -> impl Strategy<Value = FieldType> {
    prop_oneof![
        arb_primitive_type().prop_map(FieldType::Base),
        arb_class_name().prop_map(FieldType::Object),
    ]
}

prop_compose! {
    fn arb_array_field_type()(
        t in arb_non_array_field_type(),
        dim in 1..=8u8
    ) -> FieldType {
        (0..dim).fold(t, |it, _| it.into_array_type())
    }
}

pub(crate) fn arb_field_type() -> impl Strategy<Value = FieldType> {
    prop_oneof![arb_non_array_field_type(), arb_array_field_type()]
}

/// An instruction with a `u16` constant pool operand.
pub(crate) fn insn(opcode: u8, index: u16) -> [u8; 3] {
    let [hi, lo] = index.to_be_bytes();
    [opcode, hi, lo]
}

enum Member {
    Field,
    Method,
}

/// Assembles class files for tests.
pub(crate) struct ClassBuilder {
    constant_pool: ConstantPool,
    this_class: u16,
    super_class: u16,
    fields: Vec<FieldInfo>,
    methods: Vec<MethodInfo>,
    attributes: Vec<AttributeInfo>,
    bootstrap_methods: Vec<BootstrapMethod>,
    last_member: Option<Member>,
}

impl ClassBuilder {
    pub(crate) fn new(name: &str) -> Self {
        let mut constant_pool = ConstantPool::new();
        let this_class = constant_pool.put_class(name).unwrap();
        let super_class = constant_pool.put_class("java/lang/Object").unwrap();
        Self {
            constant_pool,
            this_class,
            super_class,
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
            bootstrap_methods: Vec::new(),
            last_member: None,
        }
    }

    pub(crate) fn field(mut self, access_flags: FieldAccessFlags, name: &str, descriptor: &str) -> Self {
        let field = FieldInfo {
            access_flags,
            name_index: self.constant_pool.put_utf8(name).unwrap(),
            descriptor_index: self.constant_pool.put_utf8(descriptor).unwrap(),
            attributes: Vec::new(),
        };
        self.fields.push(field);
        self.last_member = Some(Member::Field);
        self
    }

    pub(crate) fn constant_field(
        self,
        access_flags: FieldAccessFlags,
        name: &str,
        descriptor: &str,
        value: i32,
    ) -> Self {
        let mut builder = self.field(access_flags, name, descriptor);
        let value_index = builder.constant_pool.put_entry(Entry::Integer(value)).unwrap();
        builder.attribute(names::CONSTANT_VALUE, &value_index)
    }

    pub(crate) fn method(
        self,
        access_flags: MethodAccessFlags,
        name: &str,
        descriptor: &str,
        code: &[u8],
    ) -> Self {
        let code = Code {
            max_stack: 4,
            max_locals: 4,
            code: code.to_vec(),
            exception_table: Vec::new(),
            attributes: Vec::new(),
        };
        self.abstract_method(access_flags, name, descriptor)
            .attribute(names::CODE, &code)
    }

    /// A method without a body.
    pub(crate) fn abstract_method(
        mut self,
        access_flags: MethodAccessFlags,
        name: &str,
        descriptor: &str,
    ) -> Self {
        let method = MethodInfo {
            access_flags,
            name_index: self.constant_pool.put_utf8(name).unwrap(),
            descriptor_index: self.constant_pool.put_utf8(descriptor).unwrap(),
            attributes: Vec::new(),
        };
        self.methods.push(method);
        self.last_member = Some(Member::Method);
        self
    }

    /// Adds an attribute to the last added member, or to the class if there is none.
    pub(crate) fn attribute<T: ToWriter + ?Sized>(mut self, name: &str, value: &T) -> Self {
        let name_index = self.constant_pool.put_utf8(name).unwrap();
        let attribute = AttributeInfo::encode(name_index, value).unwrap();
        self.last_attributes().push(attribute);
        self
    }

    /// Adds a runtime-visible annotation of type `name` to the last added member.
    pub(crate) fn annotation(self, name: &str) -> Self {
        self.add_annotation(names::RUNTIME_VISIBLE_ANNOTATIONS, name)
    }

    /// Adds a runtime-invisible annotation of type `name` to the last added member.
    pub(crate) fn invisible_annotation(self, name: &str) -> Self {
        self.add_annotation(names::RUNTIME_INVISIBLE_ANNOTATIONS, name)
    }

    fn add_annotation(mut self, attribute_name: &str, name: &str) -> Self {
        let type_index = self.constant_pool.put_utf8(&format!("L{name};")).unwrap();
        let name_index = self.constant_pool.put_utf8(attribute_name).unwrap();
        let annotation = Annotation {
            type_index,
            element_value_pairs: Vec::new(),
        };
        let attributes = self.last_attributes();
        if let Some(existing) = attributes.iter_mut().find(|it| it.name_index == name_index) {
            let mut annotations: Vec<Annotation> = existing.decode().unwrap();
            annotations.push(annotation);
            *existing = AttributeInfo::encode(name_index, &annotations).unwrap();
        } else {
            attributes.push(AttributeInfo::encode(name_index, &vec![annotation]).unwrap());
        }
        self
    }

    fn last_attributes(&mut self) -> &mut Vec<AttributeInfo> {
        match self.last_member {
            Some(Member::Field) => &mut self.fields.last_mut().unwrap().attributes,
            Some(Member::Method) => &mut self.methods.last_mut().unwrap().attributes,
            None => &mut self.attributes,
        }
    }

    pub(crate) fn class_ref(&mut self, name: &str) -> u16 {
        self.constant_pool.put_class(name).unwrap()
    }

    pub(crate) fn utf8(&mut self, value: &str) -> u16 {
        self.constant_pool.put_utf8(value).unwrap()
    }

    pub(crate) fn field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        self.constant_pool
            .put_field_ref(&ClassMemberKey::create(owner, name, descriptor))
            .unwrap()
    }

    pub(crate) fn method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        self.constant_pool
            .put_method_ref(&ClassMemberKey::create(owner, name, descriptor), false)
            .unwrap()
    }

    pub(crate) fn interface_method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        self.constant_pool
            .put_method_ref(&ClassMemberKey::create(owner, name, descriptor), true)
            .unwrap()
    }

    /// Creates a `Runnable` call site through `LambdaMetafactory.metafactory` implemented by a
    /// static method, and returns its index.
    pub(crate) fn lambda(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        self.lambda_with("metafactory", 6, owner, name, descriptor)
    }

    pub(crate) fn lambda_with(
        &mut self,
        factory: &str,
        reference_kind: u8,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> u16 {
        let factory = ClassMemberKey::create(
            LAMBDA_METAFACTORY,
            factory,
            "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodHandle;Ljava/lang/invoke/MethodType;)Ljava/lang/invoke/CallSite;",
        );
        let factory_ref = self.constant_pool.put_method_ref(&factory, false).unwrap();
        let factory_handle = self.constant_pool.put_method_handle(6, factory_ref).unwrap();
        let implementation_ref = self.method_ref(owner, name, descriptor);
        let implementation = self
            .constant_pool
            .put_method_handle(reference_kind, implementation_ref)
            .unwrap();
        let sam_type = self.constant_pool.put_method_type("()V").unwrap();
        self.bootstrap_methods.push(BootstrapMethod {
            method_ref_index: factory_handle,
            arguments: vec![sam_type, implementation, sam_type],
        });
        let name_and_type_index = self
            .constant_pool
            .put_name_and_type("run", "()Ljava/lang/Runnable;")
            .unwrap();
        self.constant_pool
            .put_entry(Entry::InvokeDynamic {
                bootstrap_method_attr_index: u16::try_from(self.bootstrap_methods.len() - 1)
                    .unwrap(),
                name_and_type_index,
            })
            .unwrap()
    }

    pub(crate) fn build_class(mut self) -> ClassFile {
        if !self.bootstrap_methods.is_empty() {
            let name_index = self.constant_pool.put_utf8(names::BOOTSTRAP_METHODS).unwrap();
            let attribute = AttributeInfo::encode(name_index, &self.bootstrap_methods).unwrap();
            self.attributes.push(attribute);
        }
        ClassFile {
            minor_version: 0,
            major_version: 52,
            constant_pool: self.constant_pool,
            access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            this_class: self.this_class,
            super_class: self.super_class,
            interfaces: Vec::new(),
            fields: self.fields,
            methods: self.methods,
            attributes: self.attributes,
        }
    }

    pub(crate) fn build(self) -> Vec<u8> {
        self.build_class().to_bytes().unwrap()
    }
}
