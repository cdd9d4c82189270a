//! Host type descriptors and method signatures
//!
//! Descriptors use the JVM method-descriptor grammar:
//!
//! ```text
//! MethodDescriptor := '(' FieldType* ')' ReturnType
//! ReturnType       := FieldType | 'V'
//! FieldType        := 'Z' | 'B' | 'S' | 'I' | 'J' | 'C' | 'F' | 'D'
//!                   | 'L' ClassName ';'
//!                   | 'T' Name ';'          (type variable)
//!                   | '[' FieldType
//! ```
//!
//! `java/lang/String` and the boxed primitive classes get dedicated
//! descriptor variants; every other class name is a plain object reference.

use std::fmt;

use crate::error::{ProxyError, ProxyResult};

/// Host primitive types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Boolean,
    Byte,
    Short,
    Int,
    Long,
    Char,
    Float,
    Double,
}

impl PrimitiveType {
    /// Primitive type name
    pub const fn name(self) -> &'static str {
        match self {
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Byte => "byte",
            PrimitiveType::Short => "short",
            PrimitiveType::Int => "int",
            PrimitiveType::Long => "long",
            PrimitiveType::Char => "char",
            PrimitiveType::Float => "float",
            PrimitiveType::Double => "double",
        }
    }

    /// Class name of the boxed form
    pub const fn boxed_class(self) -> &'static str {
        match self {
            PrimitiveType::Boolean => "java.lang.Boolean",
            PrimitiveType::Byte => "java.lang.Byte",
            PrimitiveType::Short => "java.lang.Short",
            PrimitiveType::Int => "java.lang.Integer",
            PrimitiveType::Long => "java.lang.Long",
            PrimitiveType::Char => "java.lang.Character",
            PrimitiveType::Float => "java.lang.Float",
            PrimitiveType::Double => "java.lang.Double",
        }
    }

    /// Single-letter descriptor code
    pub const fn code(self) -> char {
        match self {
            PrimitiveType::Boolean => 'Z',
            PrimitiveType::Byte => 'B',
            PrimitiveType::Short => 'S',
            PrimitiveType::Int => 'I',
            PrimitiveType::Long => 'J',
            PrimitiveType::Char => 'C',
            PrimitiveType::Float => 'F',
            PrimitiveType::Double => 'D',
        }
    }

    fn from_code(code: char) -> Option<Self> {
        Some(match code {
            'Z' => PrimitiveType::Boolean,
            'B' => PrimitiveType::Byte,
            'S' => PrimitiveType::Short,
            'I' => PrimitiveType::Int,
            'J' => PrimitiveType::Long,
            'C' => PrimitiveType::Char,
            'F' => PrimitiveType::Float,
            'D' => PrimitiveType::Double,
            _ => return None,
        })
    }

    fn from_boxed_class(class: &str) -> Option<Self> {
        Some(match class {
            "java.lang.Boolean" => PrimitiveType::Boolean,
            "java.lang.Byte" => PrimitiveType::Byte,
            "java.lang.Short" => PrimitiveType::Short,
            "java.lang.Integer" => PrimitiveType::Int,
            "java.lang.Long" => PrimitiveType::Long,
            "java.lang.Character" => PrimitiveType::Char,
            "java.lang.Float" => PrimitiveType::Float,
            "java.lang.Double" => PrimitiveType::Double,
            _ => return None,
        })
    }
}

/// Class name of the host string type
pub const STRING_CLASS: &str = "java.lang.String";

/// Declared type of a parameter or return value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    Void,
    Primitive(PrimitiveType),
    Boxed(PrimitiveType),
    String,
    Array(Box<TypeDescriptor>),
    /// Reference to an instance of the named class (dotted form)
    Object(String),
    /// A host type with no marshaling category, kept verbatim
    Opaque(String),
}

impl TypeDescriptor {
    /// Array of `component`
    pub fn array_of(component: TypeDescriptor) -> Self {
        TypeDescriptor::Array(Box::new(component))
    }

    /// Object reference of the given class, mapping string and boxed
    /// primitive classes onto their dedicated variants.
    pub fn object(class: impl Into<String>) -> Self {
        let class = class.into().replace('/', ".");
        if class == STRING_CLASS {
            TypeDescriptor::String
        } else if let Some(primitive) = PrimitiveType::from_boxed_class(&class) {
            TypeDescriptor::Boxed(primitive)
        } else {
            TypeDescriptor::Object(class)
        }
    }

    /// Check for a reference type (nullable on the host side)
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            TypeDescriptor::Boxed(_)
                | TypeDescriptor::String
                | TypeDescriptor::Array(_)
                | TypeDescriptor::Object(_)
                | TypeDescriptor::Opaque(_)
        )
    }

    /// Component type if this is an array
    pub fn component(&self) -> Option<&TypeDescriptor> {
        match self {
            TypeDescriptor::Array(component) => Some(component),
            _ => None,
        }
    }

    /// Encode back into descriptor syntax
    pub fn descriptor(&self) -> String {
        let mut out = String::new();
        self.write_descriptor(&mut out);
        out
    }

    fn write_descriptor(&self, out: &mut String) {
        match self {
            TypeDescriptor::Void => out.push('V'),
            TypeDescriptor::Primitive(p) => out.push(p.code()),
            TypeDescriptor::Boxed(p) => push_class(out, p.boxed_class()),
            TypeDescriptor::String => push_class(out, STRING_CLASS),
            TypeDescriptor::Array(component) => {
                out.push('[');
                component.write_descriptor(out);
            }
            TypeDescriptor::Object(class) => push_class(out, class),
            TypeDescriptor::Opaque(text) => out.push_str(text),
        }
    }
}

fn push_class(out: &mut String, class: &str) {
    out.push('L');
    out.push_str(&class.replace('.', "/"));
    out.push(';');
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Void => write!(f, "void"),
            TypeDescriptor::Primitive(p) => write!(f, "{}", p.name()),
            TypeDescriptor::Boxed(p) => write!(f, "{}", p.boxed_class()),
            TypeDescriptor::String => write!(f, "{}", STRING_CLASS),
            TypeDescriptor::Array(component) => write!(f, "{}[]", component),
            TypeDescriptor::Object(class) => write!(f, "{}", class),
            TypeDescriptor::Opaque(text) => write!(f, "{}", text),
        }
    }
}

// ============================================================================
// Method signatures
// ============================================================================

/// Resolved shape of a host method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    /// Declaring class (dotted form)
    pub declaring_class: String,
    pub name: String,
    pub parameters: Vec<TypeDescriptor>,
    pub return_type: TypeDescriptor,
    pub is_static: bool,
    /// Trailing array parameter accepts a variable number of arguments
    pub is_variadic: bool,
}

impl MethodSignature {
    /// Build an instance, non-variadic signature
    pub fn new(
        declaring_class: impl Into<String>,
        name: impl Into<String>,
        parameters: Vec<TypeDescriptor>,
        return_type: TypeDescriptor,
    ) -> Self {
        Self {
            declaring_class: declaring_class.into().replace('/', "."),
            name: name.into(),
            parameters,
            return_type,
            is_static: false,
            is_variadic: false,
        }
    }

    /// Parse a method descriptor such as `"(I[Ljava/lang/String;)Z"`
    pub fn parse(
        declaring_class: impl Into<String>,
        name: impl Into<String>,
        descriptor: &str,
    ) -> ProxyResult<Self> {
        let (parameters, return_type) = DescriptorParser::new(descriptor).method()?;
        Ok(Self::new(declaring_class, name, parameters, return_type))
    }

    /// Mark as static (no receiver)
    pub fn with_static(mut self, is_static: bool) -> Self {
        self.is_static = is_static;
        self
    }

    /// Mark as variadic
    pub fn with_variadic(mut self, is_variadic: bool) -> Self {
        self.is_variadic = is_variadic;
        self
    }

    /// Check the signature is structurally usable
    pub fn validate(&self) -> ProxyResult<()> {
        if self.is_variadic && self.parameters.last().and_then(TypeDescriptor::component).is_none() {
            return Err(ProxyError::InvalidSignature(format!(
                "{}.{} is variadic but its last parameter is not an array",
                self.declaring_class, self.name
            )));
        }
        Ok(())
    }

    /// Number of declared parameters, counting a variadic tail as one
    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    /// Encode the parameter and return types as a descriptor
    pub fn descriptor(&self) -> String {
        let mut out = String::from("(");
        for parameter in &self.parameters {
            parameter.write_descriptor(&mut out);
        }
        out.push(')');
        self.return_type.write_descriptor(&mut out);
        out
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_static {
            write!(f, "static ")?;
        }
        write!(f, "{} {}.{}(", self.return_type, self.declaring_class, self.name)?;
        let last = self.parameters.len().saturating_sub(1);
        for (i, parameter) in self.parameters.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match (self.is_variadic && i == last, parameter.component()) {
                (true, Some(component)) => write!(f, "{}...", component)?,
                _ => write!(f, "{}", parameter)?,
            }
        }
        write!(f, ")")
    }
}

struct DescriptorParser<'a> {
    source: &'a str,
    pos: usize,
}

impl<'a> DescriptorParser<'a> {
    fn new(source: &'a str) -> Self {
        Self { source, pos: 0 }
    }

    fn error(&self, what: &str) -> ProxyError {
        ProxyError::InvalidSignature(format!(
            "{} at offset {} in descriptor '{}'",
            what, self.pos, self.source
        ))
    }

    fn peek(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn expect(&mut self, expected: char) -> ProxyResult<()> {
        match self.bump() {
            Some(c) if c == expected => Ok(()),
            _ => Err(self.error(&format!("expected '{}'", expected))),
        }
    }

    fn method(mut self) -> ProxyResult<(Vec<TypeDescriptor>, TypeDescriptor)> {
        self.expect('(')?;
        let mut parameters = Vec::new();
        while self.peek() != Some(')') {
            if self.peek().is_none() {
                return Err(self.error("unterminated parameter list"));
            }
            parameters.push(self.field_type()?);
        }
        self.expect(')')?;
        let return_type = if self.peek() == Some('V') {
            self.bump();
            TypeDescriptor::Void
        } else {
            self.field_type()?
        };
        if self.pos != self.source.len() {
            return Err(self.error("trailing characters"));
        }
        Ok((parameters, return_type))
    }

    fn field_type(&mut self) -> ProxyResult<TypeDescriptor> {
        let start = self.pos;
        match self.bump() {
            Some('[') => Ok(TypeDescriptor::array_of(self.field_type()?)),
            Some('L') => {
                let class = self.until_semicolon()?;
                if class.is_empty() {
                    return Err(self.error("empty class name"));
                }
                Ok(TypeDescriptor::object(class))
            }
            Some('T') => {
                self.until_semicolon()?;
                Ok(TypeDescriptor::Opaque(self.source[start..self.pos].to_string()))
            }
            Some(c) => PrimitiveType::from_code(c)
                .map(TypeDescriptor::Primitive)
                .ok_or_else(|| self.error(&format!("unknown type code '{}'", c))),
            None => Err(self.error("unexpected end")),
        }
    }

    fn until_semicolon(&mut self) -> ProxyResult<&'a str> {
        let rest = &self.source[self.pos..];
        match rest.find(';') {
            Some(end) => {
                self.pos += end + 1;
                Ok(&rest[..end])
            }
            None => Err(self.error("missing ';'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_primitives_and_string() {
        let sig = MethodSignature::parse("com/example/Calc", "mix", "(ZIJD Ljava/lang/String;)V");
        assert!(sig.is_err(), "spaces are not part of the grammar");

        let sig = MethodSignature::parse("com/example/Calc", "mix", "(ZIJDLjava/lang/String;)V").unwrap();
        assert_eq!(sig.declaring_class, "com.example.Calc");
        assert_eq!(
            sig.parameters,
            vec![
                TypeDescriptor::Primitive(PrimitiveType::Boolean),
                TypeDescriptor::Primitive(PrimitiveType::Int),
                TypeDescriptor::Primitive(PrimitiveType::Long),
                TypeDescriptor::Primitive(PrimitiveType::Double),
                TypeDescriptor::String,
            ]
        );
        assert_eq!(sig.return_type, TypeDescriptor::Void);
    }

    #[test]
    fn test_parse_boxed_arrays_and_objects() {
        let sig = MethodSignature::parse(
            "com.example.Box",
            "put",
            "(Ljava/lang/Integer;[[DLcom/example/Item;)Ljava/lang/Boolean;",
        )
        .unwrap();
        assert_eq!(sig.parameters[0], TypeDescriptor::Boxed(PrimitiveType::Int));
        assert_eq!(
            sig.parameters[1],
            TypeDescriptor::array_of(TypeDescriptor::array_of(TypeDescriptor::Primitive(
                PrimitiveType::Double
            )))
        );
        assert_eq!(sig.parameters[2], TypeDescriptor::Object("com.example.Item".to_string()));
        assert_eq!(sig.return_type, TypeDescriptor::Boxed(PrimitiveType::Boolean));
    }

    #[test]
    fn test_type_variable_is_opaque() {
        let sig = MethodSignature::parse("a.B", "id", "(TT;)TT;").unwrap();
        assert_eq!(sig.parameters[0], TypeDescriptor::Opaque("TT;".to_string()));
    }

    #[test]
    fn test_descriptor_encoding_matches_input() {
        let text = "(I[Ljava/lang/String;Lcom/example/Item;)[J";
        let sig = MethodSignature::parse("a.B", "f", text).unwrap();
        assert_eq!(sig.descriptor(), text);
    }

    #[test]
    fn test_malformed_descriptors() {
        for text in ["I)V", "(I", "(Q)V", "(Ljava/lang/String)V", "(L;)V", "()VV", "()"] {
            let err = MethodSignature::parse("a.B", "f", text).unwrap_err();
            assert!(
                matches!(err, ProxyError::InvalidSignature(_)),
                "{} should be rejected, got {:?}",
                text,
                err
            );
        }
    }

    #[test]
    fn test_variadic_requires_trailing_array() {
        let ok = MethodSignature::parse("a.B", "f", "(I[I)V").unwrap().with_variadic(true);
        assert!(ok.validate().is_ok());

        let bad = MethodSignature::parse("a.B", "f", "(II)V").unwrap().with_variadic(true);
        assert!(matches!(bad.validate(), Err(ProxyError::InvalidSignature(_))));

        let empty = MethodSignature::parse("a.B", "f", "()V").unwrap().with_variadic(true);
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_display() {
        let sig = MethodSignature::parse("com.example.Fmt", "format", "(Ljava/lang/String;[Ljava/lang/Object;)Ljava/lang/String;")
            .unwrap()
            .with_static(true)
            .with_variadic(true);
        assert_eq!(
            sig.to_string(),
            "static java.lang.String com.example.Fmt.format(java.lang.String, java.lang.Object...)"
        );
    }
}
