//! Call site representation and extraction.
//!
//! A call site is an instruction that transfers control into another method: `call`,
//! `callvirt`, `newobj` or `calli`. Its target is kept as the raw token; resolving it is the
//! introspection service's job.

use serde::Serialize;

use crate::{assembly::Instruction, metadata::token::Token};

/// How a call site invokes its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallType {
    /// Direct call (`call`)
    Call,
    /// Virtual dispatch (`callvirt`)
    CallVirt,
    /// Constructor call (`newobj`)
    NewObj,
    /// Call through a function pointer (`calli`)
    Calli,
}

impl CallType {
    /// Maps a call-shaped mnemonic to its call type.
    #[must_use]
    pub fn from_mnemonic(mnemonic: &str) -> Option<Self> {
        match mnemonic {
            "call" => Some(CallType::Call),
            "callvirt" => Some(CallType::CallVirt),
            "newobj" => Some(CallType::NewObj),
            "calli" => Some(CallType::Calli),
            _ => None,
        }
    }

    /// Returns `true` if this is a virtual call.
    #[must_use]
    pub const fn is_virtual(&self) -> bool {
        matches!(self, Self::CallVirt)
    }

    /// Returns `true` if the target is only known at run time.
    ///
    /// The token of an indirect call is a stand-alone signature, not a method.
    #[must_use]
    pub const fn is_indirect(&self) -> bool {
        matches!(self, Self::Calli)
    }

    /// Returns `true` if this is a constructor call.
    #[must_use]
    pub const fn is_constructor(&self) -> bool {
        matches!(self, Self::NewObj)
    }
}

/// A call instruction within a method body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CallSite {
    /// Offset of the call instruction
    pub offset: usize,
    /// How the call is made
    pub call_type: CallType,
    /// Method token (signature token for `calli`)
    pub token: Token,
}

impl CallSite {
    /// Creates a new call site.
    #[must_use]
    pub const fn new(offset: usize, call_type: CallType, token: Token) -> Self {
        Self {
            offset,
            call_type,
            token,
        }
    }
}

/// Collects the call sites of a decoded body, in instruction order.
///
/// # Examples
///
/// ```rust
/// use cilgraph::analysis::callgraph::{extract_call_sites, CallType};
/// use cilgraph::assembly::{decode_stream, DecodeMode};
///
/// // call 0x0A000001, newobj 0x06000002, ret
/// let code = [0x28, 0x01, 0x00, 0x00, 0x0A, 0x73, 0x02, 0x00, 0x00, 0x06, 0x2A];
/// let body = decode_stream(&code, DecodeMode::Strict)?;
/// let sites = extract_call_sites(&body.instructions);
///
/// assert_eq!(sites.len(), 2);
/// assert_eq!(sites[0].call_type, CallType::Call);
/// assert_eq!(sites[1].offset, 5);
/// # Ok::<(), cilgraph::Error>(())
/// ```
#[must_use]
pub fn extract_call_sites(instructions: &[Instruction]) -> Vec<CallSite> {
    instructions
        .iter()
        .filter_map(|instruction| {
            let call_type = CallType::from_mnemonic(instruction.mnemonic())?;
            let token = instruction.token()?;
            Some(CallSite::new(instruction.offset, call_type, token))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::{decode_stream, DecodeMode};

    #[test]
    fn test_call_type_properties() {
        assert!(!CallType::Call.is_virtual());
        assert!(CallType::CallVirt.is_virtual());
        assert!(!CallType::Calli.is_virtual());

        assert!(!CallType::Call.is_indirect());
        assert!(CallType::Calli.is_indirect());

        assert!(!CallType::Call.is_constructor());
        assert!(CallType::NewObj.is_constructor());
    }

    #[test]
    fn test_extract_all_call_shapes() {
        let code = [
            0x28, 0x01, 0x00, 0x00, 0x06, // call
            0x6F, 0x02, 0x00, 0x00, 0x0A, // callvirt
            0x73, 0x03, 0x00, 0x00, 0x06, // newobj
            0x29, 0x04, 0x00, 0x00, 0x11, // calli
            0xFE, 0x06, 0x05, 0x00, 0x00, 0x06, // ldftn is not a call
            0x2A,
        ];
        let body = decode_stream(&code, DecodeMode::Strict).unwrap();
        let sites = extract_call_sites(&body.instructions);

        let types: Vec<_> = sites.iter().map(|site| site.call_type).collect();
        assert_eq!(
            types,
            vec![
                CallType::Call,
                CallType::CallVirt,
                CallType::NewObj,
                CallType::Calli
            ]
        );
        assert_eq!(sites[3].token, Token::new(0x1100_0004));
        assert_eq!(sites[2].offset, 10);
    }

    #[test]
    fn test_no_calls() {
        let body = decode_stream(&[0x00, 0x2A], DecodeMode::Strict).unwrap();
        assert!(extract_call_sites(&body.instructions).is_empty());
    }
}
