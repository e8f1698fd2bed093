#![allow(dead_code)]

use std::{
    fs::File,
    io::{Read, Write},
    path::Path,
};

use desugar_jar::{
    desugar::config::API_GENERATING_ANNOTATION,
    jvm::{
        ClassMemberKey,
        access_flags::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags},
        bytecode::{
            ClassFile, ConstantPool, FieldInfo, MethodInfo,
            attributes::{Annotation, AttributeInfo, Code, names},
            constant_pool::Entry,
        },
    },
};
use zip::{ZipArchive, ZipWriter, write::SimpleFileOptions};

pub const GETSTATIC: u8 = 0xb2;
pub const ALOAD_0: u8 = 0x2a;
pub const INVOKEVIRTUAL: u8 = 0xb6;
pub const INVOKESTATIC: u8 = 0xb8;
pub const IRETURN: u8 = 0xac;

pub fn insn(opcode: u8, index: u16) -> Vec<u8> {
    let [hi, lo] = index.to_be_bytes();
    vec![opcode, hi, lo]
}

/// Assembles a class file through the public constant pool API.
pub struct ClassAssembler {
    pub constant_pool: ConstantPool,
    this_class: u16,
    super_class: u16,
    fields: Vec<FieldInfo>,
    methods: Vec<MethodInfo>,
}

impl ClassAssembler {
    pub fn new(name: &str) -> Self {
        let mut constant_pool = ConstantPool::new();
        let this_class = constant_pool.put_class(name).unwrap();
        let super_class = constant_pool.put_class("java/lang/Object").unwrap();
        Self {
            constant_pool,
            this_class,
            super_class,
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn constant_field(&mut self, access_flags: FieldAccessFlags, name: &str, value: i32) {
        let value_index = self.constant_pool.put_entry(Entry::Integer(value)).unwrap();
        let attribute = self.attribute(names::CONSTANT_VALUE, &value_index);
        let field = FieldInfo {
            access_flags,
            name_index: self.constant_pool.put_utf8(name).unwrap(),
            descriptor_index: self.constant_pool.put_utf8("I").unwrap(),
            attributes: vec![attribute],
        };
        self.fields.push(field);
    }

    pub fn method(
        &mut self,
        access_flags: MethodAccessFlags,
        name: &str,
        descriptor: &str,
        code: Vec<u8>,
        annotated: bool,
    ) {
        let code = Code {
            max_stack: 2,
            max_locals: 2,
            code,
            exception_table: Vec::new(),
            attributes: Vec::new(),
        };
        let mut attributes = vec![self.attribute(names::CODE, &code)];
        if annotated {
            let annotation = Annotation {
                type_index: self
                    .constant_pool
                    .put_utf8(&format!("L{API_GENERATING_ANNOTATION};"))
                    .unwrap(),
                element_value_pairs: Vec::new(),
            };
            attributes.push(self.attribute(names::RUNTIME_INVISIBLE_ANNOTATIONS, &vec![annotation]));
        }
        let method = MethodInfo {
            access_flags,
            name_index: self.constant_pool.put_utf8(name).unwrap(),
            descriptor_index: self.constant_pool.put_utf8(descriptor).unwrap(),
            attributes,
        };
        self.methods.push(method);
    }

    pub fn field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        self.constant_pool
            .put_field_ref(&ClassMemberKey::create(owner, name, descriptor))
            .unwrap()
    }

    pub fn method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        self.constant_pool
            .put_method_ref(&ClassMemberKey::create(owner, name, descriptor), false)
            .unwrap()
    }

    fn attribute<T: desugar_jar::jvm::bytecode::ToWriter>(
        &mut self,
        name: &str,
        value: &T,
    ) -> AttributeInfo {
        let name_index = self.constant_pool.put_utf8(name).unwrap();
        AttributeInfo::encode(name_index, value).unwrap()
    }

    pub fn build(self) -> Vec<u8> {
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
            attributes: Vec::new(),
        }
        .to_bytes()
        .unwrap()
    }
}

/// `pkg/Foo` with a supported instance method `bar()` that reaches `helper()` and the constant
/// `X = 42`, plus an unannotated `caller()` invoking `bar()`.
pub fn foo_class() -> Vec<u8> {
    let mut foo = ClassAssembler::new("pkg/Foo");
    foo.constant_field(
        FieldAccessFlags::PRIVATE | FieldAccessFlags::STATIC | FieldAccessFlags::FINAL,
        "X",
        42,
    );
    let x = foo.field_ref("pkg/Foo", "X", "I");
    let helper = foo.method_ref("pkg/Foo", "helper", "()I");
    let bar = foo.method_ref("pkg/Foo", "bar", "()I");
    foo.method(
        MethodAccessFlags::PUBLIC,
        "bar",
        "()I",
        [insn(INVOKESTATIC, helper), vec![IRETURN]].concat(),
        true,
    );
    foo.method(
        MethodAccessFlags::PRIVATE | MethodAccessFlags::STATIC,
        "helper",
        "()I",
        [insn(GETSTATIC, x), vec![IRETURN]].concat(),
        false,
    );
    foo.method(
        MethodAccessFlags::PUBLIC,
        "caller",
        "()I",
        [vec![ALOAD_0], insn(INVOKEVIRTUAL, bar), vec![IRETURN]].concat(),
        false,
    );
    foo.build()
}

/// A class without supported members.
pub fn plain_class(name: &str) -> Vec<u8> {
    let mut class = ClassAssembler::new(name);
    class.method(
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        "answer",
        "()I",
        vec![0x10, 42, IRETURN],
        false,
    );
    class.build()
}

pub fn write_jar(path: &Path, entries: &[(&str, &[u8])]) {
    let mut writer = ZipWriter::new(File::create(path).unwrap());
    for (name, bytes) in entries {
        if name.ends_with('/') {
            writer
                .add_directory(*name, SimpleFileOptions::default())
                .unwrap();
        } else {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(bytes).unwrap();
        }
    }
    writer.finish().unwrap();
}

/// The file entries of a JAR in archive order.
pub fn read_jar(path: &Path) -> Vec<(String, Vec<u8>)> {
    let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
    (0..archive.len())
        .map(|index| {
            let mut entry = archive.by_index(index).unwrap();
            let mut bytes = Vec::new();
            entry.read_to_end(&mut bytes).unwrap();
            (entry.name().to_owned(), bytes)
        })
        .collect()
}

pub fn entry<'a>(entries: &'a [(String, Vec<u8>)], name: &str) -> Option<&'a [u8]> {
    entries
        .iter()
        .find(|(it, _)| it == name)
        .map(|(_, bytes)| bytes.as_slice())
}
