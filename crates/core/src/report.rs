//! Razer 90-byte command report encoding and decoding.
//!
//! Every request and response on the control channel is one fixed-size report:
//!
//! ```text
//! offset  size  field
//!      0     1  status            (response only)
//!      1     1  transaction_id    (3-bit device channel | 5-bit tag)
//!      2     2  remaining_packets (big-endian, echoed)
//!      4     1  protocol_type     (always 0)
//!      5     1  data_size         (<= 80)
//!      6     1  command_class
//!      7     1  command_id        (bit 7 set = device->host)
//!      8    80  arguments
//!     88     1  crc               (XOR of bytes 1..88)
//!     89     1  reserved          (always 0)
//! ```
//!
//! Requests are assembled with a [`ReportBuilder`] and turned into an
//! immutable [`Report`] by [`ReportBuilder::finalize`], which stamps the CRC.

use crate::error::{Error, Result};
use std::fmt;

/// Total report length on the wire.
pub const REPORT_LEN: usize = 90;
/// Length of the argument payload area.
pub const ARGS_LEN: usize = 80;

const STATUS: usize = 0;
const TRANSACTION_ID: usize = 1;
const REMAINING_PACKETS: usize = 2;
const PROTOCOL_TYPE: usize = 4;
const DATA_SIZE: usize = 5;
const COMMAND_CLASS: usize = 6;
const COMMAND_ID: usize = 7;
const ARGS: usize = 8;
const CRC: usize = 88;
const RESERVED: usize = 89;

/// Status byte reported by the device in a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Request not yet picked up by the firmware.
    New,
    Busy,
    Successful,
    Failure,
    Timeout,
    NotSupported,
    Unknown(u8),
}

impl Status {
    pub fn from_byte(b: u8) -> Self {
        match b {
            0x00 => Self::New,
            0x01 => Self::Busy,
            0x02 => Self::Successful,
            0x03 => Self::Failure,
            0x04 => Self::Timeout,
            0x05 => Self::NotSupported,
            other => Self::Unknown(other),
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::New => 0x00,
            Self::Busy => 0x01,
            Self::Successful => 0x02,
            Self::Failure => 0x03,
            Self::Timeout => 0x04,
            Self::NotSupported => 0x05,
            Self::Unknown(b) => b,
        }
    }
}

/// Transaction tag byte: 3-bit device channel in the high bits, 5-bit tag below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(pub u8);

impl TransactionId {
    /// Tag used by first-generation devices.
    pub const LEGACY: Self = Self(0xFF);
    /// Channel 1, tag 0x1F. Used by most Chroma-era mice.
    pub const STANDARD: Self = Self(0x3F);
    /// Channel 0, tag 0x1F. Used by recent firmware.
    pub const MODERN: Self = Self(0x1F);
    /// Channel 4, tag 0. Used by wireless docks for frame uploads.
    pub const WIRELESS_DOCK: Self = Self(0x80);

    pub fn new(device: u8, tag: u8) -> Self {
        Self(((device & 0x07) << 5) | (tag & 0x1F))
    }

    pub fn device(self) -> u8 {
        self.0 >> 5
    }

    pub fn tag(self) -> u8 {
        self.0 & 0x1F
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

/// The three fields a response must echo back from its request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Echo {
    pub remaining_packets: u16,
    pub command_class: u8,
    pub command_id: u8,
}

impl fmt::Display for Echo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "packets={} class=0x{:02X} id=0x{:02X}",
            self.remaining_packets, self.command_class, self.command_id
        )
    }
}

/// XOR checksum over every byte except status, crc and reserved.
pub fn compute_crc(bytes: &[u8; REPORT_LEN]) -> u8 {
    bytes[TRANSACTION_ID..CRC].iter().fold(0, |acc, b| acc ^ b)
}

/// Start a zero-filled request with the given header fields.
pub fn build_empty_report(command_class: u8, command_id: u8, data_size: u8) -> Result<ReportBuilder> {
    ReportBuilder::new(command_class, command_id, data_size)
}

/// Decode raw response bytes. The length must be exactly [`REPORT_LEN`].
pub fn parse_response(bytes: &[u8]) -> Result<Report> {
    let raw: &[u8; REPORT_LEN] = bytes.try_into().map_err(|_| {
        Error::MalformedResponse(format!(
            "expected {REPORT_LEN} bytes, got {}",
            bytes.len()
        ))
    })?;
    Ok(Report { raw: *raw })
}

/// Mutable report under construction. Consumed by [`finalize`](Self::finalize).
#[derive(Clone, PartialEq, Eq)]
pub struct ReportBuilder {
    raw: [u8; REPORT_LEN],
}

impl ReportBuilder {
    pub fn new(command_class: u8, command_id: u8, data_size: u8) -> Result<Self> {
        check_data_size(data_size as usize)?;
        let mut raw = [0u8; REPORT_LEN];
        raw[TRANSACTION_ID] = TransactionId::LEGACY.0;
        raw[DATA_SIZE] = data_size;
        raw[COMMAND_CLASS] = command_class;
        raw[COMMAND_ID] = command_id;
        Ok(Self { raw })
    }

    pub fn transaction_id(mut self, id: TransactionId) -> Self {
        self.raw[TRANSACTION_ID] = id.0;
        self
    }

    pub fn remaining_packets(mut self, packets: u16) -> Self {
        self.raw[REMAINING_PACKETS..PROTOCOL_TYPE].copy_from_slice(&packets.to_be_bytes());
        self
    }

    /// Only meaningful when synthesising responses (simulators, tests).
    pub fn status(mut self, status: Status) -> Self {
        self.raw[STATUS] = status.as_byte();
        self
    }

    pub fn set_data_size(&mut self, data_size: usize) -> Result<()> {
        check_data_size(data_size)?;
        self.raw[DATA_SIZE] = data_size as u8;
        Ok(())
    }

    pub fn data_size(&self) -> usize {
        self.raw[DATA_SIZE] as usize
    }

    /// Set a single argument byte. Out-of-range indices are rejected.
    pub fn set_arg(&mut self, index: usize, value: u8) -> Result<()> {
        self.set_args(index, &[value])
    }

    /// Copy `bytes` into the argument area starting at `offset`.
    pub fn set_args(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        let end = match offset.checked_add(bytes.len()) {
            Some(end) if end <= ARGS_LEN => end,
            end => {
                return Err(Error::InvalidPayloadSize {
                    actual: end.unwrap_or(usize::MAX),
                    expected: ARGS_LEN,
                })
            }
        };
        self.raw[ARGS + offset..ARGS + end].copy_from_slice(bytes);
        Ok(())
    }

    pub fn command_class(&self) -> u8 {
        self.raw[COMMAND_CLASS]
    }

    pub fn command_id(&self) -> u8 {
        self.raw[COMMAND_ID]
    }

    /// Stamp the CRC and freeze the report.
    pub fn finalize(self) -> Report {
        let mut raw = self.raw;
        raw[CRC] = compute_crc(&raw);
        raw[RESERVED] = 0;
        Report { raw }
    }
}

impl fmt::Debug for ReportBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportBuilder")
            .field("class", &format_args!("0x{:02X}", self.command_class()))
            .field("id", &format_args!("0x{:02X}", self.command_id()))
            .field("data_size", &self.data_size())
            .finish()
    }
}

fn check_data_size(data_size: usize) -> Result<()> {
    if data_size > ARGS_LEN {
        return Err(Error::InvalidPayloadSize {
            actual: data_size,
            expected: ARGS_LEN,
        });
    }
    Ok(())
}

/// A finalized request or a parsed response. Read-only.
#[derive(Clone, PartialEq, Eq)]
pub struct Report {
    raw: [u8; REPORT_LEN],
}

impl Report {
    pub fn status(&self) -> Status {
        Status::from_byte(self.raw[STATUS])
    }

    pub fn transaction_id(&self) -> TransactionId {
        TransactionId(self.raw[TRANSACTION_ID])
    }

    pub fn remaining_packets(&self) -> u16 {
        u16::from_be_bytes([self.raw[REMAINING_PACKETS], self.raw[REMAINING_PACKETS + 1]])
    }

    pub fn protocol_type(&self) -> u8 {
        self.raw[PROTOCOL_TYPE]
    }

    pub fn data_size(&self) -> usize {
        self.raw[DATA_SIZE] as usize
    }

    pub fn command_class(&self) -> u8 {
        self.raw[COMMAND_CLASS]
    }

    pub fn command_id(&self) -> u8 {
        self.raw[COMMAND_ID]
    }

    /// Whether the command id marks a device->host (read) command.
    pub fn is_read(&self) -> bool {
        self.command_id() & 0x80 != 0
    }

    /// The full 80-byte argument area.
    pub fn arguments(&self) -> &[u8] {
        &self.raw[ARGS..CRC]
    }

    /// Argument bytes covered by `data_size` (clamped to the argument area).
    pub fn payload(&self) -> &[u8] {
        &self.arguments()[..self.data_size().min(ARGS_LEN)]
    }

    /// Argument byte at `index`, or 0 when outside the argument area.
    pub fn arg(&self, index: usize) -> u8 {
        self.arguments().get(index).copied().unwrap_or(0)
    }

    pub fn crc(&self) -> u8 {
        self.raw[CRC]
    }

    pub fn reserved(&self) -> u8 {
        self.raw[RESERVED]
    }

    /// Recompute the checksum over the current bytes.
    pub fn compute_crc(&self) -> u8 {
        compute_crc(&self.raw)
    }

    pub fn crc_matches(&self) -> bool {
        self.crc() == self.compute_crc()
    }

    pub fn echo(&self) -> Echo {
        Echo {
            remaining_packets: self.remaining_packets(),
            command_class: self.command_class(),
            command_id: self.command_id(),
        }
    }

    pub fn as_bytes(&self) -> &[u8; REPORT_LEN] {
        &self.raw
    }

    /// One-line summary used in logs and error messages.
    pub fn describe(&self) -> String {
        format!(
            "status=0x{:02X} trans={} {} size={}",
            self.raw[STATUS],
            self.transaction_id(),
            self.echo(),
            self.data_size()
        )
    }
}

impl fmt::Debug for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Report")
            .field("status", &self.status())
            .field("transaction_id", &self.transaction_id())
            .field("echo", &self.echo())
            .field("payload", &format_args!("{:02X?}", self.payload()))
            .field("crc", &format_args!("0x{:02X}", self.crc()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_report_header_layout() {
        let report = build_empty_report(0x0F, 0x02, 0x06)
            .unwrap()
            .transaction_id(TransactionId::STANDARD)
            .remaining_packets(0x0102)
            .finalize();
        let bytes = report.as_bytes();
        assert_eq!(bytes[0], 0x00);
        assert_eq!(bytes[1], 0x3F);
        assert_eq!(&bytes[2..4], &[0x01, 0x02]);
        assert_eq!(bytes[4], 0x00);
        assert_eq!(bytes[5], 0x06);
        assert_eq!(bytes[6], 0x0F);
        assert_eq!(bytes[7], 0x02);
        assert!(bytes[8..88].iter().all(|&b| b == 0));
        assert_eq!(bytes[89], 0x00);
    }

    #[test]
    fn data_size_over_80_rejected() {
        assert!(matches!(
            build_empty_report(0x03, 0x0B, 81),
            Err(Error::InvalidPayloadSize { actual: 81, .. })
        ));
        assert!(build_empty_report(0x03, 0x0B, 80).is_ok());
    }

    #[test]
    fn set_args_bounds_checked() {
        let mut b = build_empty_report(0x03, 0x0B, 0x46).unwrap();
        assert!(b.set_args(78, &[1, 2]).is_ok());
        assert!(b.set_args(79, &[1, 2]).is_err());
        assert!(matches!(
            b.set_args(usize::MAX, &[1]),
            Err(Error::InvalidPayloadSize { .. })
        ));
    }

    #[test]
    fn crc_matches_known_capture() {
        // SET LED MATRIX effect static red on backlight, tag 0x3F
        let mut b = build_empty_report(0x0F, 0x02, 0x09)
            .unwrap()
            .transaction_id(TransactionId::STANDARD);
        b.set_args(0, &[0x01, 0x05, 0x01, 0x00, 0x00, 0x01, 0xFF, 0x00, 0x00])
            .unwrap();
        let r = b.finalize();
        let expected = [0x3Fu8, 0x09, 0x0F, 0x02, 0x01, 0x05, 0x01, 0x01, 0xFF]
            .iter()
            .fold(0, |a, b| a ^ b);
        assert_eq!(r.crc(), expected);
        assert!(r.crc_matches());
    }

    #[test]
    fn parse_response_requires_exact_length() {
        assert!(matches!(
            parse_response(&[0u8; 89]),
            Err(Error::MalformedResponse(_))
        ));
        assert!(parse_response(&[0u8; 91]).is_err());
        assert!(parse_response(&[0u8; 90]).is_ok());
    }

    #[test]
    fn parse_response_reads_fields() {
        let mut raw = [0u8; REPORT_LEN];
        raw[0] = 0x02;
        raw[1] = 0x3F;
        raw[3] = 0x03;
        raw[5] = 0x02;
        raw[6] = 0x07;
        raw[7] = 0x80;
        raw[9] = 0xFF;
        let r = parse_response(&raw).unwrap();
        assert_eq!(r.status(), Status::Successful);
        assert_eq!(r.remaining_packets(), 3);
        assert_eq!(r.command_class(), 0x07);
        assert!(r.is_read());
        assert_eq!(r.payload(), &[0x00, 0xFF]);
        assert_eq!(r.arg(1), 0xFF);
        assert_eq!(r.arg(200), 0);
    }

    #[test]
    fn payload_clamped_when_device_claims_oversize() {
        let mut raw = [0u8; REPORT_LEN];
        raw[5] = 0xFF;
        let r = parse_response(&raw).unwrap();
        assert_eq!(r.payload().len(), ARGS_LEN);
    }

    #[test]
    fn transaction_id_fields() {
        let id = TransactionId::STANDARD;
        assert_eq!(id.device(), 0b001);
        assert_eq!(id.tag(), 0x1F);
        assert_eq!(TransactionId::new(1, 0x1F), id);
        assert_eq!(TransactionId::WIRELESS_DOCK.device(), 0b100);
    }

    #[test]
    fn status_byte_roundtrip() {
        for b in 0u8..=0x07 {
            assert_eq!(Status::from_byte(b).as_byte(), b);
        }
        assert_eq!(Status::from_byte(0x09), Status::Unknown(0x09));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        /// The CRC stored by finalize equals the CRC recomputed afterwards.
        #[test]
        fn prop_finalize_crc_consistent(
            class in any::<u8>(),
            id in any::<u8>(),
            size in 0u8..=80,
            tag in any::<u8>(),
            packets in any::<u16>(),
            args in proptest::collection::vec(any::<u8>(), ARGS_LEN),
        ) {
            let mut b = build_empty_report(class, id, size)
                .unwrap()
                .transaction_id(TransactionId(tag))
                .remaining_packets(packets);
            b.set_args(0, &args).unwrap();
            let r = b.finalize();
            prop_assert_eq!(r.crc(), r.compute_crc());
        }

        /// Flipping any covered byte changes the checksum.
        #[test]
        fn prop_flipping_covered_byte_changes_crc(
            seed in proptest::collection::vec(any::<u8>(), REPORT_LEN),
            index in 1usize..88,
            mask in 1u8..=255,
        ) {
            let mut raw = [0u8; REPORT_LEN];
            raw.copy_from_slice(&seed);
            let before = compute_crc(&raw);
            raw[index] ^= mask;
            prop_assert_ne!(compute_crc(&raw), before);
        }

        /// Status, crc and reserved bytes never affect the checksum.
        #[test]
        fn prop_excluded_bytes_ignored(
            seed in proptest::collection::vec(any::<u8>(), REPORT_LEN),
            status in any::<u8>(),
            crc in any::<u8>(),
            reserved in any::<u8>(),
        ) {
            let mut raw = [0u8; REPORT_LEN];
            raw.copy_from_slice(&seed);
            let before = compute_crc(&raw);
            raw[0] = status;
            raw[88] = crc;
            raw[89] = reserved;
            prop_assert_eq!(compute_crc(&raw), before);
        }
    }
}
