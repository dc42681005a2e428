//! MAC PDU (DL-SCH / UL-SCH) assembly and parsing.
//!
//! A PDU is a run of subheaders followed by the payloads in the same order.
//! Subheader byte 0 is R/R/E/LCID. LCIDs 29..=31 are fixed size and have no length
//! field, all others carry a 7-bit length (F=0) or a 15-bit length (F=1).

use nbiot_core::{Lcid, PduParseErr};

pub mod lcid {
    use nbiot_core::Lcid;

    pub const CCCH: Lcid = 0;
    pub const DCCH: Lcid = 1;
    pub const DTCH: Lcid = 2;
    pub const PHR: Lcid = 26;
    pub const SHORT_BSR: Lcid = 29;
    pub const LONG_BSR: Lcid = 30;
    pub const PADDING: Lcid = 31;
}

const EXT_BIT: u8 = 0x20;
const FORMAT_BIT: u8 = 0x80;
const LCID_MASK: u8 = 0x1F;
const MAX_LEN: usize = 0x7FFF;

/// Upper bound in bytes of each buffer size level of a BSR (36.321 Table 6.1.3.1-1)
pub const BSR_BUFFER_SIZE_BYTES: [u32; 64] = [
    0, 10, 12, 14, 17, 19, 22, 26, 31, 36, 42, 49, 57, 67, 78, 91,
    107, 125, 146, 171, 200, 234, 274, 321, 376, 440, 515, 603, 706, 826, 967, 1132,
    1326, 1552, 1817, 2127, 2490, 2915, 3413, 3995, 4677, 5476, 6411, 7505, 8787, 10287, 12043, 14099,
    16507, 19325, 22624, 26487, 31009, 36304, 42502, 49759, 58255, 68201, 79846, 93479, 109439, 128125, 150000, 150000,
];

pub fn bsr_index_to_bytes(idx: u8) -> u32 {
    BSR_BUFFER_SIZE_BYTES[(idx & 0x3F) as usize]
}

/// Smallest level whose upper bound covers `bytes`
pub fn bsr_bytes_to_index(bytes: u32) -> u8 {
    BSR_BUFFER_SIZE_BYTES.iter()
        .position(|&bound| bytes <= bound)
        .unwrap_or(BSR_BUFFER_SIZE_BYTES.len() - 1) as u8
}

pub fn is_fixed_size(lcid: Lcid) -> bool {
    (lcid::SHORT_BSR..=lcid::PADDING).contains(&lcid)
}

/// Size in bytes of the subheader describing a payload of `len` bytes on `lcid`
pub fn subheader_len(lcid: Lcid, len: usize) -> usize {
    if is_fixed_size(lcid) {
        1
    } else if len > 127 {
        3
    } else {
        2
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacPduElement {
    Sdu { lcid: Lcid, payload: Vec<u8> },
    ShortBsr { lcg: u8, buffer_size_idx: u8 },
    LongBsr { buffer_size_idx: [u8; 4] },
    Phr { ph: u8 },
    /// Padding bytes following the padding subheader
    Padding(usize),
}

impl MacPduElement {
    fn lcid(&self) -> Lcid {
        match self {
            MacPduElement::Sdu { lcid, .. } => *lcid,
            MacPduElement::ShortBsr { .. } => lcid::SHORT_BSR,
            MacPduElement::LongBsr { .. } => lcid::LONG_BSR,
            MacPduElement::Phr { .. } => lcid::PHR,
            MacPduElement::Padding(_) => lcid::PADDING,
        }
    }

    fn payload_len(&self) -> usize {
        match self {
            MacPduElement::Sdu { payload, .. } => payload.len(),
            MacPduElement::ShortBsr { .. } => 1,
            MacPduElement::LongBsr { .. } => 3,
            MacPduElement::Phr { .. } => 1,
            MacPduElement::Padding(len) => *len,
        }
    }

    fn write_payload(&self, out: &mut Vec<u8>) {
        match self {
            MacPduElement::Sdu { payload, .. } => out.extend_from_slice(payload),
            MacPduElement::ShortBsr { lcg, buffer_size_idx } => {
                out.push(((lcg & 0x03) << 6) | (buffer_size_idx & 0x3F));
            }
            MacPduElement::LongBsr { buffer_size_idx: b } => {
                let packed = ((b[0] as u32 & 0x3F) << 18)
                    | ((b[1] as u32 & 0x3F) << 12)
                    | ((b[2] as u32 & 0x3F) << 6)
                    | (b[3] as u32 & 0x3F);
                out.extend_from_slice(&packed.to_be_bytes()[1..]);
            }
            MacPduElement::Phr { ph } => out.push(ph & 0x3F),
            MacPduElement::Padding(len) => out.resize(out.len() + *len, 0),
        }
    }

    /// Reported uplink backlog, for BSR elements
    pub fn reported_buffer_bytes(&self) -> Option<u32> {
        match self {
            MacPduElement::ShortBsr { buffer_size_idx, .. } => Some(bsr_index_to_bytes(*buffer_size_idx)),
            MacPduElement::LongBsr { buffer_size_idx } => {
                Some(buffer_size_idx.iter().map(|&idx| bsr_index_to_bytes(idx)).sum())
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MacPdu {
    elements: Vec<MacPduElement>,
}

impl MacPdu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elements(&self) -> &[MacPduElement] {
        &self.elements
    }

    /// Serialized size in bytes
    pub fn size(&self) -> usize {
        self.elements.iter()
            .map(|e| subheader_len(e.lcid(), e.payload_len()) + e.payload_len())
            .sum()
    }

    fn push(&mut self, element: MacPduElement) {
        // Padding always stays last
        match self.elements.last() {
            Some(MacPduElement::Padding(_)) => {
                let idx = self.elements.len() - 1;
                self.elements.insert(idx, element);
            }
            _ => self.elements.push(element),
        }
    }

    pub fn add_sdu(&mut self, lcid: Lcid, payload: Vec<u8>) {
        debug_assert!(payload.len() <= MAX_LEN);
        self.push(MacPduElement::Sdu { lcid, payload });
    }

    pub fn add_short_bsr(&mut self, lcg: u8, buffer_size_idx: u8) {
        self.push(MacPduElement::ShortBsr { lcg, buffer_size_idx });
    }

    pub fn add_long_bsr(&mut self, buffer_size_idx: [u8; 4]) {
        self.push(MacPduElement::LongBsr { buffer_size_idx });
    }

    pub fn add_phr(&mut self, ph: u8) {
        self.push(MacPduElement::Phr { ph });
    }

    /// Appends padding so that the PDU serializes to exactly `target_size` bytes.
    /// Does nothing if the PDU already fills the target.
    pub fn add_padding(&mut self, target_size: usize) {
        let size = self.size();
        if size >= target_size {
            return;
        }
        self.elements.push(MacPduElement::Padding(target_size - size - 1));
    }

    /// Iterates over (lcid, payload) of all SDUs
    pub fn sdus(&self) -> impl Iterator<Item = (Lcid, &[u8])> {
        self.elements.iter().filter_map(|e| match e {
            MacPduElement::Sdu { lcid, payload } => Some((*lcid, payload.as_slice())),
            _ => None,
        })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.size());
        let last = self.elements.len().saturating_sub(1);

        for (i, e) in self.elements.iter().enumerate() {
            let lcid = e.lcid();
            let ext = if i < last { EXT_BIT } else { 0 };
            out.push(ext | (lcid & LCID_MASK));
            if !is_fixed_size(lcid) {
                let len = e.payload_len();
                if len > 127 {
                    out.push(FORMAT_BIT | ((len >> 8) as u8 & 0x7F));
                    out.push((len & 0xFF) as u8);
                } else {
                    out.push(len as u8 & 0x7F);
                }
            }
        }
        for e in self.elements.iter() {
            e.write_payload(&mut out);
        }
        out
    }

    pub fn parse(buf: &[u8]) -> Result<MacPdu, PduParseErr> {
        // Subheaders: (lcid, length)
        let mut headers: Vec<(Lcid, usize)> = Vec::new();
        let mut pos = 0;
        loop {
            let b0 = *buf.get(pos).ok_or(PduParseErr::BufferEnded { field: Some("subheader") })?;
            pos += 1;
            let lcid = b0 & LCID_MASK;
            if (11..=25).contains(&lcid) {
                return Err(PduParseErr::InvalidValue { field: "lcid", value: lcid as u64 });
            }
            let len = match lcid {
                lcid::SHORT_BSR => 1,
                lcid::LONG_BSR => 3,
                lcid::PADDING => 0,
                _ => {
                    let l0 = *buf.get(pos).ok_or(PduParseErr::BufferEnded { field: Some("length") })?;
                    pos += 1;
                    if l0 & FORMAT_BIT != 0 {
                        let l1 = *buf.get(pos).ok_or(PduParseErr::BufferEnded { field: Some("length") })?;
                        pos += 1;
                        (((l0 & 0x7F) as usize) << 8) | l1 as usize
                    } else {
                        l0 as usize
                    }
                }
            };
            headers.push((lcid, len));
            if b0 & EXT_BIT == 0 {
                break;
            }
        }

        let mut elements = Vec::with_capacity(headers.len());
        for (lcid, len) in headers {
            if lcid == lcid::PADDING {
                // Rest of the PDU is padding
                elements.push(MacPduElement::Padding(buf.len() - pos));
                pos = buf.len();
                break;
            }
            let end = pos + len;
            let body = buf.get(pos..end).ok_or(PduParseErr::BufferEnded { field: Some("payload") })?;
            pos = end;
            let element = match lcid {
                lcid::SHORT_BSR => MacPduElement::ShortBsr { lcg: body[0] >> 6, buffer_size_idx: body[0] & 0x3F },
                lcid::LONG_BSR => {
                    let packed = u32::from_be_bytes([0, body[0], body[1], body[2]]);
                    MacPduElement::LongBsr {
                        buffer_size_idx: [
                            ((packed >> 18) & 0x3F) as u8,
                            ((packed >> 12) & 0x3F) as u8,
                            ((packed >> 6) & 0x3F) as u8,
                            (packed & 0x3F) as u8,
                        ],
                    }
                }
                lcid::PHR => {
                    if len != 1 {
                        return Err(PduParseErr::InconsistentLength { expected: 1, found: len });
                    }
                    MacPduElement::Phr { ph: body[0] & 0x3F }
                }
                _ => MacPduElement::Sdu { lcid, payload: body.to_vec() },
            };
            elements.push(element);
        }

        if pos != buf.len() {
            tracing::debug!("parse: {} trailing bytes after last element", buf.len() - pos);
        }

        Ok(MacPdu { elements })
    }
}
