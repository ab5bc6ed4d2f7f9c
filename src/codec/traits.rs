use super::FormatError;
use std::io::{Result, Write};

// Types that can be written as SSDP wire text
pub trait WireEncode {
    fn encode<W: Write>(&self, writer: &mut W) -> Result<()>;

    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.encode(&mut buf);
        buf
    }
}

// Types that can be parsed from SSDP wire text
pub trait WireDecode: Sized {
    fn decode(text: &str) -> std::result::Result<Self, FormatError>;
}
