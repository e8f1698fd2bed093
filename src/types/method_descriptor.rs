//! Non-generic JVM method descriptors.

use std::str::FromStr;

use itertools::Itertools;

use super::{Descriptor, InvalidDescriptor, field_type::FieldType};
use crate::macros::see_jvm_spec;

/// The descriptor of a method.
/// Consists of the parameters types and the return type.
#[doc = see_jvm_spec!(4, 3, 3)]
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone)]
pub struct MethodDescriptor {
    /// The type of the parameters.
    pub parameters_types: Vec<FieldType>,
    /// The return type.
    pub return_type: ReturnType,
}

/// Denotes the return type of a method.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone)]
pub enum ReturnType {
    /// The method returns a specific type.
    Some(FieldType),
    /// The return type of the method is `void`.
    Void,
}

impl MethodDescriptor {
    /// Replaces every class name in the parameter and return types for which `mapper` returns a
    /// new name.
    #[must_use]
    pub fn remap<F>(&self, mapper: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let parameters_types = self
            .parameters_types
            .iter()
            .map(|it| it.remap(mapper))
            .collect();
        let return_type = match &self.return_type {
            ReturnType::Some(it) => ReturnType::Some(it.remap(mapper)),
            ReturnType::Void => ReturnType::Void,
        };
        Self {
            parameters_types,
            return_type,
        }
    }
}

impl Descriptor for MethodDescriptor {
    fn descriptor(&self) -> String {
        format!(
            "({}){}",
            self.parameters_types.iter().map(FieldType::descriptor).join(""),
            self.return_type.descriptor()
        )
    }
}

impl FromStr for MethodDescriptor {
    type Err = InvalidDescriptor;

    fn from_str(descriptor: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidDescriptor(descriptor.to_owned());
        let mut chars = descriptor.chars();
        if chars.next() != Some('(') {
            return Err(invalid());
        }
        let mut parameters_types = Vec::new();
        loop {
            if chars.clone().next() == Some(')') {
                chars.next();
                break;
            }
            let param = FieldType::parse_prefix(&mut chars).map_err(|_| invalid())?;
            parameters_types.push(param);
        }
        let return_type = ReturnType::from_str(chars.as_str()).map_err(|_| invalid())?;
        Ok(Self {
            parameters_types,
            return_type,
        })
    }
}

impl FromStr for ReturnType {
    type Err = InvalidDescriptor;

    fn from_str(descriptor: &str) -> Result<Self, Self::Err> {
        if descriptor == "V" {
            Ok(ReturnType::Void)
        } else {
            FieldType::from_str(descriptor).map(ReturnType::Some)
        }
    }
}

impl Descriptor for ReturnType {
    fn descriptor(&self) -> String {
        match self {
            ReturnType::Some(it) => it.descriptor(),
            ReturnType::Void => "V".to_owned(),
        }
    }
}
