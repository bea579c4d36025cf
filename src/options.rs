//! Codec configuration

/// Tunable limits and behaviors shared by the encoder and the decoder.
///
/// The defaults match what mainstream directory servers accept; all
/// fields are plain data and the structure can be freely cloned per
/// stream.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CodecOptions {
    /// Maximum accepted size of a single PDU, header included.
    ///
    /// The decoder fails with `MaxPduExceeded` as soon as the outer
    /// SEQUENCE header announces a larger message, before any content
    /// is buffered.
    pub max_pdu_size: u32,
    /// Keep attribute description options such as `;binary` verbatim.
    ///
    /// When false, the decoder strips everything from the first `;` of
    /// an attribute description. This normalization loses the option on
    /// re-encoding, so leave it enabled when byte fidelity matters.
    pub allow_binary_attribute_option: bool,
    /// Reject invalid UTF-8 in string-typed fields.
    ///
    /// When false (the default), invalid sequences are replaced with
    /// U+FFFD the way most servers do; when true, decoding fails with
    /// `InvalidUtf8`.
    pub strict_string_validation: bool,
    /// Trim leading whitespace from `matchedDN` while encoding.
    pub trim_matched_dn: bool,
}

pub(crate) const DEFAULT_MAX_PDU_SIZE: u32 = 2 * 1024 * 1024;

impl Default for CodecOptions {
    fn default() -> Self {
        CodecOptions {
            max_pdu_size: DEFAULT_MAX_PDU_SIZE,
            allow_binary_attribute_option: true,
            strict_string_validation: false,
            trim_matched_dn: true,
        }
    }
}

impl CodecOptions {
    pub fn max_pdu_size(mut self, size: u32) -> Self {
        self.max_pdu_size = size;
        self
    }

    pub fn allow_binary_attribute_option(mut self, allow: bool) -> Self {
        self.allow_binary_attribute_option = allow;
        self
    }

    pub fn strict_string_validation(mut self, strict: bool) -> Self {
        self.strict_string_validation = strict;
        self
    }

    pub fn trim_matched_dn(mut self, trim: bool) -> Self {
        self.trim_matched_dn = trim;
        self
    }
}
