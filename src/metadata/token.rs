//! Metadata tokens as they appear in CIL operands.
//!
//! Call instructions, field accesses, `ldtoken`, `ldstr` and `calli` all carry a 4-byte token.
//! The decoder never resolves them; they are handed to the
//! [`crate::metadata::introspection::ModuleIntrospection`] service on demand.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A metadata token representing a reference to a metadata table entry.
///
/// Tokens in .NET metadata consist of a 32-bit value where:
/// - The high byte (bits 24-31) indicates the table type
/// - The low 24 bits (bits 0-23) indicate the row index within that table
///
/// Tokens serialize as their plain 32-bit value.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(pub u32);

impl Token {
    /// Table id of `TypeRef` tokens
    pub const TYPE_REF: u8 = 0x01;
    /// Table id of `TypeDef` tokens
    pub const TYPE_DEF: u8 = 0x02;
    /// Table id of `Field` tokens
    pub const FIELD: u8 = 0x04;
    /// Table id of `MethodDef` tokens
    pub const METHOD_DEF: u8 = 0x06;
    /// Table id of `MemberRef` tokens
    pub const MEMBER_REF: u8 = 0x0A;
    /// Table id of `StandAloneSig` tokens (`calli` signatures)
    pub const STANDALONE_SIG: u8 = 0x11;
    /// Table id of `TypeSpec` tokens
    pub const TYPE_SPEC: u8 = 0x1B;
    /// Table id of `MethodSpec` tokens (generic method instantiations)
    pub const METHOD_SPEC: u8 = 0x2B;
    /// Pseudo table id of `#US` heap references (`ldstr`)
    pub const USER_STRING: u8 = 0x70;

    /// Creates a new token from a raw 32-bit value
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Token(value)
    }

    /// Returns the raw token value
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.0
    }

    /// Extracts the table type from the token (high byte)
    #[must_use]
    pub const fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Extracts the row index from the token (low 24 bits)
    #[must_use]
    pub const fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Returns true if this is a null token (value 0)
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Returns true if the token can name a method (`MethodDef`, `MemberRef` or `MethodSpec`).
    #[must_use]
    pub const fn is_method_reference(&self) -> bool {
        matches!(
            self.table(),
            Self::METHOD_DEF | Self::MEMBER_REF | Self::METHOD_SPEC
        )
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_parts() {
        let token = Token::new(0x0A00_0012);
        assert_eq!(token.value(), 0x0A00_0012);
        assert_eq!(token.table(), Token::MEMBER_REF);
        assert_eq!(token.row(), 0x12);
        assert!(!token.is_null());
        assert!(Token::new(0).is_null());
    }

    #[test]
    fn test_token_method_reference() {
        assert!(Token::new(0x0600_0001).is_method_reference());
        assert!(Token::new(0x0A00_0001).is_method_reference());
        assert!(Token::new(0x2B00_0001).is_method_reference());
        assert!(!Token::new(0x1100_0001).is_method_reference());
        assert!(!Token::new(0x7000_0001).is_method_reference());
    }

    #[test]
    fn test_token_formatting() {
        let token = Token(0x0600_0001);
        assert_eq!(format!("{token}"), "0x06000001");

        let debug_str = format!("{token:?}");
        assert!(debug_str.contains("Token(0x06000001"));
        assert!(debug_str.contains("table: 0x06"));
        assert!(debug_str.contains("row: 1"));
    }

    #[test]
    fn test_token_serde() {
        let token = Token::new(0x0A00_0003);
        assert_eq!(serde_json::to_string(&token).unwrap(), "167772163");
        let back: Token = serde_json::from_str("167772163").unwrap();
        assert_eq!(back, token);
    }

    #[test]
    fn test_token_conversion() {
        let token: Token = 0x0200_0005_u32.into();
        let back: u32 = token.into();
        assert_eq!(back, 0x0200_0005);
        assert!(Token(0x0600_0001) < Token(0x0600_0002));
    }
}
