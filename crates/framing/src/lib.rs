//! Wire framing between the runtime mock inside a container and the host.
//!
//! The mock prints two base64 regions on stdout, one holding the raw HTTP
//! response of the function and one holding execution metadata. Anything
//! else on stdout is the function's own logging.

pub mod decoder;
pub mod encoder;
pub mod http;
pub mod reader;
pub mod sink;

pub use decoder::*;
pub use encoder::*;
pub use http::*;
pub use reader::*;
pub use sink::*;

pub const RESPONSE_BEGIN: &str = "--------------------response begin-----------------";
pub const RESPONSE_END: &str = "--------------------response end-----------------";
pub const EXECUTION_INFO_BEGIN: &str = "--------------------execution info begin-----------------";
pub const EXECUTION_INFO_END: &str = "--------------------execution info end-----------------";

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

/// Accepts both padded and unpadded input, like the mock's `base64` tool output.
pub(crate) const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);
