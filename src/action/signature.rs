// src/action/signature.rs

//! JVM descriptor and generic signature rewriting
//!
//! Field and method descriptors as well as `Signature` attribute strings
//! are parsed with the grammar of JVMS 4.3 and 4.7.9.1; only the binary
//! class names inside `L...;` are passed to the rename callback. Strings
//! that do not parse completely are reported as "not a signature".

/// Result of rewriting one descriptor or signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureRewrite {
    pub text: String,
    /// Class references found
    pub references: usize,
    /// Class references renamed
    pub renamed: usize,
}

#[derive(Clone, Copy)]
enum Form {
    Method,
    Field,
    Class,
}

/// Rewrite the class names of a descriptor or signature
///
/// Returns `None` when `input` is not a well-formed descriptor or
/// signature, or when it references no class at all.
pub fn rewrite<F>(input: &str, rename: F) -> Option<SignatureRewrite>
where
    F: Fn(&str) -> Option<String>,
{
    for form in [Form::Method, Form::Field, Form::Class] {
        let mut parser = Parser::new(input.as_bytes(), &rename);
        let parsed = match form {
            Form::Method => parser.method(),
            Form::Field => parser.java_type(),
            Form::Class => parser.class_signature(),
        };
        if parsed.is_some() && parser.at_end() {
            if parser.references == 0 {
                return None;
            }
            return parser.finish();
        }
    }
    None
}

/// Characters that terminate or are illegal inside an unqualified name
const RESERVED: &[u8] = b"()[;<>:.^";

struct Parser<'a, F> {
    input: &'a [u8],
    pos: usize,
    out: Vec<u8>,
    rename: &'a F,
    references: usize,
    renamed: usize,
}

impl<'a, F> Parser<'a, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn new(input: &'a [u8], rename: &'a F) -> Self {
        Self {
            input,
            pos: 0,
            out: Vec::with_capacity(input.len()),
            rename,
            references: 0,
            renamed: 0,
        }
    }

    fn at_end(&self) -> bool {
        self.pos == self.input.len()
    }

    fn finish(self) -> Option<SignatureRewrite> {
        Some(SignatureRewrite {
            text: String::from_utf8(self.out).ok()?,
            references: self.references,
            renamed: self.renamed,
        })
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        self.out.push(b);
        Some(b)
    }

    fn expect(&mut self, expected: u8) -> Option<()> {
        (self.bump()? == expected).then_some(())
    }

    /// Read a name up to (not including) one of `stops`; not emitted
    fn name(&mut self, stops: &[u8]) -> Option<&'a [u8]> {
        let input = self.input;
        let start = self.pos;
        loop {
            let b = *input.get(self.pos)?;
            if stops.contains(&b) {
                break;
            }
            if RESERVED.contains(&b) {
                return None;
            }
            self.pos += 1;
        }
        (self.pos > start).then(|| &input[start..self.pos])
    }

    fn java_type(&mut self) -> Option<()> {
        match self.peek()? {
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' => {
                self.bump();
                Some(())
            }
            _ => self.reference_type(),
        }
    }

    fn reference_type(&mut self) -> Option<()> {
        match self.peek()? {
            b'L' => self.class_type(),
            b'T' => {
                self.bump();
                let variable = self.name(b";")?;
                self.out.extend_from_slice(variable);
                self.expect(b';')
            }
            b'[' => {
                self.bump();
                self.java_type()
            }
            _ => None,
        }
    }

    fn class_type(&mut self) -> Option<()> {
        self.expect(b'L')?;
        let name = self.name(b";<.")?;
        let name = std::str::from_utf8(name).ok()?;
        self.references += 1;
        match (self.rename)(name) {
            Some(renamed) => {
                self.out.extend_from_slice(renamed.as_bytes());
                self.renamed += 1;
            }
            None => self.out.extend_from_slice(name.as_bytes()),
        }

        if self.peek()? == b'<' {
            self.type_arguments()?;
        }
        while self.peek()? == b'.' {
            self.bump();
            let inner = self.name(b";<.")?;
            self.out.extend_from_slice(inner);
            if self.peek()? == b'<' {
                self.type_arguments()?;
            }
        }
        self.expect(b';')
    }

    fn type_arguments(&mut self) -> Option<()> {
        self.expect(b'<')?;
        let mut count = 0;
        loop {
            match self.peek()? {
                b'>' if count > 0 => {
                    self.bump();
                    return Some(());
                }
                b'*' => {
                    self.bump();
                }
                b'+' | b'-' => {
                    self.bump();
                    self.reference_type()?;
                }
                _ => self.reference_type()?,
            }
            count += 1;
        }
    }

    fn type_parameters(&mut self) -> Option<()> {
        self.expect(b'<')?;
        let mut count = 0;
        loop {
            if self.peek()? == b'>' && count > 0 {
                self.bump();
                return Some(());
            }
            let parameter = self.name(b":")?;
            self.out.extend_from_slice(parameter);
            self.expect(b':')?;
            if matches!(self.peek()?, b'L' | b'T' | b'[') {
                self.reference_type()?;
            }
            while self.peek()? == b':' {
                self.bump();
                self.reference_type()?;
            }
            count += 1;
        }
    }

    fn method(&mut self) -> Option<()> {
        if self.peek()? == b'<' {
            self.type_parameters()?;
        }
        self.expect(b'(')?;
        while self.peek()? != b')' {
            self.java_type()?;
        }
        self.bump();
        if self.peek()? == b'V' {
            self.bump();
        } else {
            self.java_type()?;
        }
        while self.peek() == Some(b'^') {
            self.bump();
            self.reference_type()?;
        }
        Some(())
    }

    fn class_signature(&mut self) -> Option<()> {
        if self.peek()? == b'<' {
            self.type_parameters()?;
        }
        self.class_type()?;
        while !self.at_end() {
            self.class_type()?;
        }
        Some(())
    }
}
