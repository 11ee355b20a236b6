//! Method bodies: CIL code bytes plus their protected regions.
//!
//! A [`MethodBody`] is what the introspection service hands to the analysis layer. It can be
//! built directly from code and exception clauses, or parsed from a complete on-disk method
//! body including the tiny or fat header and the trailing exception handling sections.
//!
//! # References
//! - ECMA-335 6th Edition, Partition II, Section 25.4 - Method Header Format

use bitflags::bitflags;

use crate::{
    analysis::regions::ProtectedRegion,
    file::parser::Parser,
    metadata::{
        method::{ExceptionHandler, ExceptionHandlerFlags},
        token::Token,
    },
    Result,
};

bitflags! {
    /// Flags of the method header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MethodBodyFlags: u16 {
        /// Tiny method header format
        const TINY_FORMAT = 0x2;
        /// Fat method header format
        const FAT_FORMAT = 0x3;
        /// More data sections follow the code
        const MORE_SECTS = 0x8;
        /// Call the default constructor on all local variables
        const INIT_LOCALS = 0x10;
    }
}

bitflags! {
    /// Flags of an extra data section following the code.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SectionFlags: u8 {
        /// Section contains exception handling data
        const EHTABLE = 0x1;
        /// Reserved, shall be 0
        const OPT_ILTABLE = 0x2;
        /// Section uses the fat clause layout
        const FAT_FORMAT = 0x40;
        /// Another section follows this one
        const MORE_SECTS = 0x80;
    }
}

/// The code of one method together with its protected regions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodBody {
    /// Raw CIL instruction bytes, header excluded
    pub code: Vec<u8>,
    /// Protected regions, innermost first
    pub regions: Vec<ProtectedRegion>,
    /// Maximum evaluation stack depth (8 for tiny headers)
    pub max_stack: u16,
    /// Signature of the local variables, if the method declares any
    pub local_var_sig: Option<Token>,
}

impl MethodBody {
    /// Creates a body from code bytes and ECMA-335 exception clauses.
    #[must_use]
    pub fn new(code: Vec<u8>, handlers: &[ExceptionHandler]) -> Self {
        MethodBody {
            code,
            regions: ProtectedRegion::from_handlers(handlers),
            max_stack: 8,
            local_var_sig: None,
        }
    }

    /// Parses a complete method body: header, code and exception handling sections.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the header is neither tiny nor fat, and
    /// [`crate::Error::OutOfBounds`] if the header announces more code than `data` holds.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use cilgraph::metadata::method::MethodBody;
    ///
    /// // tiny header announcing 2 code bytes: nop, ret
    /// let body = MethodBody::parse(&[0x0A, 0x00, 0x2A])?;
    /// assert_eq!(body.code, vec![0x00, 0x2A]);
    /// assert!(body.regions.is_empty());
    /// # Ok::<(), cilgraph::Error>(())
    /// ```
    pub fn parse(data: &[u8]) -> Result<MethodBody> {
        let mut parser = Parser::new(data);
        let first_byte = parser.peek_byte()?;

        match MethodBodyFlags::from_bits_truncate(u16::from(first_byte & 0b11)) {
            MethodBodyFlags::TINY_FORMAT => {
                parser.advance_by(1)?;
                let code = parser.read_bytes((first_byte >> 2) as usize)?;
                Ok(MethodBody {
                    code: code.to_vec(),
                    regions: Vec::new(),
                    max_stack: 8,
                    local_var_sig: None,
                })
            }
            MethodBodyFlags::FAT_FORMAT => {
                let first_duo = parser.read_le::<u16>()?;
                let flags = MethodBodyFlags::from_bits_truncate(first_duo & 0x0FFF);
                let size_header = usize::from(first_duo >> 12) * 4;
                let max_stack = parser.read_le::<u16>()?;
                let size_code = parser.read_le::<u32>()? as usize;
                let local_var_sig = parser.read_le::<u32>()?;

                if size_header < 12 {
                    return Err(malformed_error!("Fat header of {} bytes", size_header));
                }
                parser.seek(size_header)?;
                let code = parser.read_bytes(size_code)?.to_vec();

                let handlers = if flags.contains(MethodBodyFlags::MORE_SECTS) {
                    // sections start at the next 4-byte boundary
                    let aligned = (size_header + size_code + 3) & !3;
                    parser.seek(aligned.min(data.len()))?;
                    read_sections(&mut parser)?
                } else {
                    Vec::new()
                };

                Ok(MethodBody {
                    code,
                    regions: ProtectedRegion::from_handlers(&handlers),
                    max_stack,
                    local_var_sig: (local_var_sig != 0).then_some(Token::new(local_var_sig)),
                })
            }
            _ => Err(malformed_error!(
                "Method header is neither fat nor tiny - {:#04x}",
                first_byte
            )),
        }
    }
}

fn read_sections(parser: &mut Parser) -> Result<Vec<ExceptionHandler>> {
    let mut handlers = Vec::new();

    while parser.remaining() >= 4 {
        let section_start = parser.pos();
        let section_flags = SectionFlags::from_bits_truncate(parser.read_le::<u8>()?);
        if !section_flags.contains(SectionFlags::EHTABLE) {
            break;
        }

        let is_fat = section_flags.contains(SectionFlags::FAT_FORMAT);
        let section_size = if is_fat {
            let low = u32::from(parser.read_le::<u8>()?);
            let high = u32::from(parser.read_le::<u16>()?);
            (low | (high << 8)) as usize
        } else {
            let size = parser.read_le::<u8>()? as usize;
            parser.advance_by(2)?;
            size
        };
        if section_size < 4 || section_start + section_size > parser.len() {
            break;
        }

        let clause_size = if is_fat { 24 } else { 12 };
        for _ in 0..(section_size - 4) / clause_size {
            handlers.push(read_clause(parser, is_fat)?);
        }

        if !section_flags.contains(SectionFlags::MORE_SECTS) {
            break;
        }
    }

    Ok(handlers)
}

fn read_clause(parser: &mut Parser, is_fat: bool) -> Result<ExceptionHandler> {
    let (flags, try_offset, try_length, handler_offset, handler_length) = if is_fat {
        // clause flags are a u32 field, only the low bits are defined
        #[allow(clippy::cast_possible_truncation)]
        let flags = ExceptionHandlerFlags::from_bits_truncate(parser.read_le::<u32>()? as u16);
        (
            flags,
            parser.read_le::<u32>()?,
            parser.read_le::<u32>()?,
            parser.read_le::<u32>()?,
            parser.read_le::<u32>()?,
        )
    } else {
        (
            ExceptionHandlerFlags::from_bits_truncate(parser.read_le::<u16>()?),
            u32::from(parser.read_le::<u16>()?),
            u32::from(parser.read_le::<u8>()?),
            u32::from(parser.read_le::<u16>()?),
            u32::from(parser.read_le::<u8>()?),
        )
    };
    let class_or_filter = parser.read_le::<u32>()?;

    let is_typed = flags.is_empty();
    Ok(ExceptionHandler {
        flags,
        try_offset,
        try_length,
        handler_offset,
        handler_length,
        class_token: is_typed.then_some(Token::new(class_or_filter)),
        filter_offset: if flags.contains(ExceptionHandlerFlags::FILTER) {
            class_or_filter
        } else {
            0
        },
    })
}
