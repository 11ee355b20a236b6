//! Serialized form of a module manifest.
//!
//! A manifest describes one module as JSON: its types, their methods with code bytes and
//! exception clauses, and the member references its call sites use to reach other modules.
//!
//! ```json
//! {
//!   "name": "Contoso.App",
//!   "types": [{
//!     "name": "Contoso.Program",
//!     "methods": [{
//!       "name": "Main",
//!       "token": "0x06000001",
//!       "body": "28 01 00 00 0A 2A"
//!     }]
//!   }],
//!   "member_refs": [{
//!     "token": "0x0A000001",
//!     "module": "Contoso.Core",
//!     "declaring_type": "Contoso.Core.Service",
//!     "name": "Run"
//!   }]
//! }
//! ```
//!
//! Tokens are written as hex strings or plain numbers. Code is either a hex string (whitespace
//! ignored) or an array of bytes.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{
    metadata::{
        method::{ExceptionHandler, ExceptionHandlerFlags},
        token::Token,
    },
    Result,
};

/// One module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleManifest {
    /// Module identity, as other manifests refer to it
    pub name: String,
    /// Types defined in the module
    #[serde(default)]
    pub types: Vec<TypeEntry>,
    /// Method references to this and other modules
    #[serde(default)]
    pub member_refs: Vec<MemberRefEntry>,
}

impl ModuleManifest {
    /// Parses a manifest from JSON text.
    ///
    /// # Errors
    /// Returns [`crate::Error::ManifestError`] if `text` is not a valid manifest.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Serializes the manifest as pretty-printed JSON.
    ///
    /// # Errors
    /// Returns [`crate::Error::ManifestError`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// One type and its methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeEntry {
    /// Fully qualified type name; nested types use `Outer+Inner` or `Outer/Inner`
    pub name: String,
    /// Methods in declaration order
    #[serde(default)]
    pub methods: Vec<MethodEntry>,
}

/// One method definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodEntry {
    /// Method name
    pub name: String,
    /// MethodDef token
    #[serde(with = "token_text")]
    pub token: Token,
    /// Signature text telling overloads apart
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Code bytes; absent for abstract and runtime-provided methods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<CodeBytes>,
    /// `true` if `body` starts with a tiny or fat method header
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub has_header: bool,
    /// Exception clauses, for bodies without header
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exception_handlers: Vec<HandlerEntry>,
    /// Compiler-generated asynchronous entry point
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_async: bool,
    /// Name of the state machine type, if it does not follow `<Method>d__N`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_machine: Option<String>,
}

impl MethodEntry {
    /// A method with a header-less body.
    #[must_use]
    pub fn new(name: impl Into<String>, token: Token, code: Vec<u8>) -> Self {
        MethodEntry {
            name: name.into(),
            token,
            signature: None,
            body: Some(CodeBytes::Bytes(code)),
            has_header: false,
            exception_handlers: Vec::new(),
            is_async: false,
            state_machine: None,
        }
    }

    /// A method without body.
    #[must_use]
    pub fn bodiless(name: impl Into<String>, token: Token) -> Self {
        MethodEntry {
            body: None,
            ..MethodEntry::new(name, token, Vec::new())
        }
    }
}

/// Code bytes as hex text or byte array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CodeBytes {
    /// `"2A"`, `"28 01 00 00 0A"`, ...
    Hex(String),
    /// `[40, 1, 0, 0, 10]`
    Bytes(Vec<u8>),
}

impl CodeBytes {
    /// The decoded bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for odd-length or non-hex text.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            CodeBytes::Bytes(bytes) => Ok(bytes.clone()),
            CodeBytes::Hex(text) => {
                let digits: Vec<u8> = text
                    .bytes()
                    .filter(|byte| !byte.is_ascii_whitespace())
                    .collect();
                if digits.len() % 2 != 0 {
                    return Err(malformed_error!(
                        "Odd number of hex digits in code: {}",
                        digits.len()
                    ));
                }

                digits
                    .chunks(2)
                    .map(|pair| match (hex_value(pair[0]), hex_value(pair[1])) {
                        (Some(high), Some(low)) => Ok((high << 4) | low),
                        _ => Err(malformed_error!(
                            "Invalid hex digits '{}{}' in code",
                            pair[0] as char,
                            pair[1] as char
                        )),
                    })
                    .collect()
            }
        }
    }
}

fn hex_value(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}

/// Kind of an exception clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    /// Typed catch
    Catch,
    /// Filter followed by a handler
    Filter,
    /// Finally
    Finally,
    /// Fault
    Fault,
}

/// One exception clause, in the ECMA-335 shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerEntry {
    /// Clause kind
    pub kind: HandlerKind,
    /// Start of the protected range
    pub try_offset: u32,
    /// Length of the protected range
    pub try_length: u32,
    /// Start of the handler
    pub handler_offset: u32,
    /// Length of the handler
    pub handler_length: u32,
    /// Caught type, for `catch`
    #[serde(default, with = "optional_token_text", skip_serializing_if = "Option::is_none")]
    pub class_token: Option<Token>,
    /// Start of the filter block, for `filter`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_offset: Option<u32>,
}

impl From<&HandlerEntry> for ExceptionHandler {
    fn from(entry: &HandlerEntry) -> Self {
        let flags = match entry.kind {
            HandlerKind::Catch => ExceptionHandlerFlags::EXCEPTION,
            HandlerKind::Filter => ExceptionHandlerFlags::FILTER,
            HandlerKind::Finally => ExceptionHandlerFlags::FINALLY,
            HandlerKind::Fault => ExceptionHandlerFlags::FAULT,
        };

        ExceptionHandler {
            flags,
            try_offset: entry.try_offset,
            try_length: entry.try_length,
            handler_offset: entry.handler_offset,
            handler_length: entry.handler_length,
            class_token: entry.class_token,
            filter_offset: entry.filter_offset.unwrap_or(0),
        }
    }
}

/// A MemberRef or MethodSpec token and the method it stands for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRefEntry {
    /// Reference token
    #[serde(with = "token_text")]
    pub token: Token,
    /// Declaring module; the referencing module when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    /// Fully qualified declaring type
    pub declaring_type: String,
    /// Method name
    pub name: String,
    /// Overload signature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TokenRepr {
    Number(u32),
    Text(String),
}

impl TokenRepr {
    fn into_token<E: serde::de::Error>(self) -> std::result::Result<Token, E> {
        match self {
            TokenRepr::Number(value) => Ok(Token::new(value)),
            TokenRepr::Text(text) => {
                let digits = text
                    .strip_prefix("0x")
                    .or_else(|| text.strip_prefix("0X"))
                    .unwrap_or(&text);
                u32::from_str_radix(digits, 16)
                    .map(Token::new)
                    .map_err(|_| E::custom(format!("invalid token '{text}'")))
            }
        }
    }
}

mod token_text {
    use super::{Deserialize, Deserializer, Serializer, Token, TokenRepr};

    pub fn serialize<S: Serializer>(token: &Token, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{:08X}", token.value()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Token, D::Error> {
        TokenRepr::deserialize(deserializer)?.into_token()
    }
}

mod optional_token_text {
    use super::{Deserialize, Deserializer, Serializer, Token, TokenRepr};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(
        token: &Option<Token>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match token {
            Some(token) => super::token_text::serialize(token, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Token>, D::Error> {
        Option::<TokenRepr>::deserialize(deserializer)?
            .map(TokenRepr::into_token)
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "name": "Contoso.App",
        "types": [{
            "name": "Contoso.Program",
            "methods": [
                { "name": "Main", "token": "0x06000001", "body": "28 01 00 00 0A 2A" },
                { "name": "Abstract", "token": 100663298 },
                {
                    "name": "Guarded",
                    "token": "06000003",
                    "body": [0, 222, 1, 0, 220, 42],
                    "exception_handlers": [{
                        "kind": "finally",
                        "try_offset": 0, "try_length": 3,
                        "handler_offset": 3, "handler_length": 2
                    }]
                }
            ]
        }],
        "member_refs": [{
            "token": "0x0A000001",
            "module": "Contoso.Core",
            "declaring_type": "Contoso.Core.Service",
            "name": "Run"
        }]
    }"#;

    #[test]
    fn parse_sample() {
        let manifest = ModuleManifest::from_json(SAMPLE).unwrap();
        assert_eq!(manifest.name, "Contoso.App");

        let methods = &manifest.types[0].methods;
        assert_eq!(methods[0].token, Token::new(0x0600_0001));
        assert_eq!(methods[1].token, Token::new(0x0600_0002));
        assert_eq!(methods[2].token, Token::new(0x0600_0003));
        assert!(methods[1].body.is_none());

        let code = methods[0].body.as_ref().unwrap().to_bytes().unwrap();
        assert_eq!(code, vec![0x28, 0x01, 0x00, 0x00, 0x0A, 0x2A]);

        let handler = ExceptionHandler::from(&methods[2].exception_handlers[0]);
        assert_eq!(handler.flags, ExceptionHandlerFlags::FINALLY);
        assert_eq!(handler.handler_range(), 3..5);

        assert_eq!(manifest.member_refs[0].module.as_deref(), Some("Contoso.Core"));
    }

    #[test]
    fn json_round_trip() {
        let manifest = ModuleManifest::from_json(SAMPLE).unwrap();
        let again = ModuleManifest::from_json(&manifest.to_json().unwrap()).unwrap();
        assert_eq!(manifest, again);
        assert!(manifest.to_json().unwrap().contains("\"0x0A000001\""));
    }

    #[test]
    fn bad_hex() {
        assert!(CodeBytes::Hex("2".into()).to_bytes().is_err());
        assert!(CodeBytes::Hex("zz".into()).to_bytes().is_err());
        assert_eq!(
            CodeBytes::Hex("2a 00".into()).to_bytes().unwrap(),
            vec![0x2A, 0x00]
        );
    }

    #[test]
    fn bad_token() {
        let text = r#"{ "name": "M", "token": "0xNOPE" }"#;
        assert!(serde_json::from_str::<MethodEntry>(text).is_err());
    }
}
