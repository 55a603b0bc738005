//! Instrument address tokens.
//!
//! A VISA backend addresses an instrument by its full resource string
//! (`GPIB0::5::INSTR`, `USB0::...::INSTR`). A Prologix bridge only needs the
//! primary address of the device on its GPIB bus, so `GPIB0::17::INSTR` and a
//! bare `17` name the same device on the serial transport.

use crate::error::{GpibError, GpibResult};
use std::fmt;
use std::str::FromStr;

/// Highest primary address allowed on a GPIB bus.
pub const MAX_PRIMARY_ADDRESS: u8 = 30;

/// Where a transport should send its traffic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    /// Full VISA resource string.
    Resource(String),
    /// GPIB primary address on the bus behind a serial bridge.
    Gpib(u8),
}

impl Address {
    /// The GPIB primary address carried by this token, if any.
    ///
    /// Resource strings of the form `GPIB<board>::<primary>[::<secondary>]::INSTR`
    /// yield their primary address; other interfaces yield `None`.
    pub fn gpib_primary(&self) -> Option<u8> {
        match self {
            Address::Gpib(n) => Some(*n),
            Address::Resource(s) => {
                let mut parts = s.split("::");
                let interface = parts.next()?;
                if !interface.to_ascii_uppercase().starts_with("GPIB") {
                    return None;
                }
                parts.next()?.trim().parse().ok()
            }
        }
    }

    /// The resource string a VISA resource manager should open.
    pub fn resource_string(&self) -> String {
        match self {
            Address::Resource(s) => s.clone(),
            Address::Gpib(n) => format!("GPIB0::{}::INSTR", n),
        }
    }
}

impl FromStr for Address {
    type Err = GpibError;

    fn from_str(s: &str) -> GpibResult<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(GpibError::Address("empty address".to_string()));
        }
        if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Ok(Address::Resource(trimmed.to_string()));
        }
        match trimmed.parse::<u8>() {
            Ok(n) if n <= MAX_PRIMARY_ADDRESS => Ok(Address::Gpib(n)),
            _ => Err(GpibError::Address(format!(
                "primary address {} out of range (0-{})",
                trimmed, MAX_PRIMARY_ADDRESS
            ))),
        }
    }
}

impl From<u8> for Address {
    fn from(n: u8) -> Self {
        Address::Gpib(n)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Resource(s) => write!(f, "{}", s),
            Address::Gpib(n) => write!(f, "{}", n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_integer() {
        let addr: Address = "17".parse().unwrap();
        assert_eq!(addr, Address::Gpib(17));
        assert_eq!(addr.to_string(), "17");
    }

    #[test]
    fn test_parse_resource_string() {
        let addr: Address = "GPIB0::17::INSTR".parse().unwrap();
        assert_eq!(addr, Address::Resource("GPIB0::17::INSTR".to_string()));
        assert_eq!(addr.gpib_primary(), Some(17));
        assert_eq!(addr.resource_string(), "GPIB0::17::INSTR");
    }

    #[test]
    fn test_empty_address_rejected() {
        assert!(matches!("  ".parse::<Address>(), Err(GpibError::Address(_))));
    }

    #[test]
    fn test_parse_numeric_out_of_range() {
        for raw in ["31", "300", "99999999999"] {
            match raw.parse::<Address>() {
                Err(GpibError::Address(msg)) => {
                    assert!(msg.contains("out of range (0-30)"), "{}", msg)
                }
                other => panic!("{} parsed as {:?}", raw, other),
            }
        }
        assert_eq!("30".parse::<Address>().unwrap(), Address::Gpib(30));
    }

    #[test]
    fn test_gpib_primary_extraction() {
        let cases = vec![
            ("GPIB1::5::INSTR", Some(5)),
            ("gpib0::22::3::INSTR", Some(22)),
            ("USB0::0x1AB1::0x04CE::DS1ZA123456789::INSTR", None),
            ("TCPIP0::192.168.1.100::INSTR", None),
            ("GPIB0::INTFC", None),
        ];

        for (input, expected) in cases {
            let addr = Address::Resource(input.to_string());
            assert_eq!(addr.gpib_primary(), expected, "input: {}", input);
        }
    }

    #[test]
    fn test_gpib_to_resource_string() {
        assert_eq!(Address::Gpib(4).resource_string(), "GPIB0::4::INSTR");
    }
}
