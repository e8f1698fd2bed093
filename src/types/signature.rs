//! Generic signatures carried by `Signature` attributes.
//!
//! Only the class names inside a signature are of interest here, so instead of building a full
//! model the parser copies the signature through while remapping every class type it meets.

use std::{iter::Peekable, str::Chars};

use super::InvalidDescriptor;
use crate::macros::see_jvm_spec;

/// Rewrites the top-level class names in a class, method or field signature.
#[doc = see_jvm_spec!(4, 7, 9)]
/// # Errors
/// Returns [`InvalidDescriptor`] if `signature` does not follow the signature grammar.
pub fn remap_signature<F>(signature: &str, mapper: &F) -> Result<String, InvalidDescriptor>
where
    F: Fn(&str) -> Option<String>,
{
    let mut remapper = SignatureRemapper {
        input: signature.chars().peekable(),
        output: String::with_capacity(signature.len()),
        mapper,
    };
    remapper
        .signature()
        .ok_or_else(|| InvalidDescriptor(signature.to_owned()))?;
    Ok(remapper.output)
}

struct SignatureRemapper<'s, 'm, F> {
    input: Peekable<Chars<'s>>,
    output: String,
    mapper: &'m F,
}

impl<F> SignatureRemapper<'_, '_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn signature(&mut self) -> Option<()> {
        if self.peek() == Some('<') {
            self.type_parameters()?;
        }
        if self.peek() == Some('(') {
            self.bump();
            while self.peek()? != ')' {
                self.java_type()?;
            }
            self.bump();
            if self.peek()? == 'V' {
                self.bump();
            } else {
                self.java_type()?;
            }
            while self.peek() == Some('^') {
                self.bump();
                self.reference_type()?;
            }
        } else {
            self.reference_type()?;
            while self.peek().is_some() {
                self.reference_type()?;
            }
        }
        self.peek().is_none().then_some(())
    }

    fn type_parameters(&mut self) -> Option<()> {
        self.expect('<')?;
        while self.peek()? != '>' {
            self.identifier();
            self.expect(':')?;
            if self.peek()? != ':' {
                self.reference_type()?;
            }
            while self.peek()? == ':' {
                self.bump();
                self.reference_type()?;
            }
        }
        self.expect('>')
    }

    fn java_type(&mut self) -> Option<()> {
        match self.peek()? {
            'B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z' => {
                self.bump();
                Some(())
            }
            _ => self.reference_type(),
        }
    }

    fn reference_type(&mut self) -> Option<()> {
        match self.peek()? {
            'L' => self.class_type(),
            'T' => {
                self.bump();
                self.identifier();
                self.expect(';')
            }
            '[' => {
                self.bump();
                self.java_type()
            }
            _ => None,
        }
    }

    fn class_type(&mut self) -> Option<()> {
        self.expect('L')?;
        let mut binary_name = String::new();
        while let Some(c) = self.input.next_if(|c| !matches!(c, '<' | '.' | ';')) {
            binary_name.push(c);
        }
        if binary_name.is_empty() {
            return None;
        }
        let remapped = (self.mapper)(&binary_name).unwrap_or(binary_name);
        self.output.push_str(&remapped);
        loop {
            match self.peek()? {
                '<' => self.type_arguments()?,
                '.' => {
                    self.bump();
                    self.identifier();
                }
                ';' => {
                    self.bump();
                    return Some(());
                }
                _ => return None,
            }
        }
    }

    fn type_arguments(&mut self) -> Option<()> {
        self.expect('<')?;
        while self.peek()? != '>' {
            match self.peek()? {
                '*' => self.bump(),
                '+' | '-' => {
                    self.bump();
                    self.reference_type()?;
                }
                _ => self.reference_type()?,
            }
        }
        self.expect('>')
    }

    fn identifier(&mut self) {
        while let Some(c) = self
            .input
            .next_if(|c| !matches!(c, '.' | ';' | '[' | '/' | '<' | '>' | ':'))
        {
            self.output.push(c);
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.input.peek().copied()
    }

    fn bump(&mut self) {
        if let Some(c) = self.input.next() {
            self.output.push(c);
        }
    }

    fn expect(&mut self, expected: char) -> Option<()> {
        (self.input.next()? == expected).then(|| self.output.push(expected))
    }
}
