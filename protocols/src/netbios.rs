//! NetBIOS Name Service node-status datagrams (RFC 1001/1002).
//!
//! A resolution probe is a node-status (NBSTAT) request for the wildcard name
//! `*`, broadcast to UDP 137. Every NetBIOS-speaking host on the subnet answers
//! with its local name table; the source address of the reply is the host's IP.

use thiserror::Error;

pub const NBSTAT: u16 = 0x0021;
pub const CLASS_IN: u16 = 0x0001;

/// Workstation service suffix.
pub const SUFFIX_WORKSTATION: u8 = 0x00;
/// File server service suffix. Hosts exporting shares register this one.
pub const SUFFIX_FILE_SERVER: u8 = 0x20;

pub const HEADER_LEN: usize = 12;
const ENCODED_NAME_LEN: usize = 32;
const MAX_NAME_LEN: usize = 15;
const NAME_ENTRY_LEN: usize = 18;
const STATISTICS_LEN: usize = 46;
const WILDCARD: &str = "*";

const FLAG_RESPONSE: u16 = 0x8000;
const FLAG_AUTHORITATIVE: u16 = 0x0400;
const FLAG_BROADCAST: u16 = 0x0010;

const NAME_FLAG_GROUP: u16 = 0x8000;
const NAME_FLAG_ACTIVE: u16 = 0x0400;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("datagram truncated at offset {offset} (length {len})")]
    Truncated { offset: usize, len: usize },
    #[error("datagram is not a response")]
    NotAResponse,
    #[error("datagram is not a request")]
    NotARequest,
    #[error("datagram carries no node status record")]
    NoNodeStatus,
    #[error("invalid encoded name")]
    InvalidName,
    #[error("name {0:?} longer than 15 bytes")]
    NameTooLong(String),
    #[error("too many names for one node status record ({0})")]
    TooManyNames(usize),
}

/// One entry of a node's name table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeName {
    pub name: String,
    pub suffix: u8,
    pub group: bool,
}

/// A parsed node-status reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    pub transaction_id: u16,
    pub names: Vec<NodeName>,
}

impl NodeName {
    pub fn unique(name: impl Into<String>, suffix: u8) -> Self {
        Self {
            name: name.into(),
            suffix,
            group: false,
        }
    }

    pub fn group(name: impl Into<String>, suffix: u8) -> Self {
        Self {
            name: name.into(),
            suffix,
            group: true,
        }
    }
}

impl NodeStatus {
    /// The name the node is known by on the network.
    ///
    /// Prefers the unique file server name, then the unique workstation name,
    /// then any unique name. Group names (workgroups, domains) never qualify.
    pub fn hostname(&self) -> Option<&str> {
        let unique = || self.names.iter().filter(|n| !n.group && !n.name.is_empty());
        unique()
            .find(|n| n.suffix == SUFFIX_FILE_SERVER)
            .or_else(|| unique().find(|n| n.suffix == SUFFIX_WORKSTATION))
            .or_else(|| unique().next())
            .map(|n| n.name.as_str())
    }
}

/// Picks a random transaction id for a new probe.
pub fn random_transaction_id() -> u16 {
    rand::random()
}

/// First-level encoding: the name is upper-cased, padded to 15 bytes and
/// followed by the suffix; each byte is split into two nibbles offset by `'A'`.
/// The wildcard `*` is padded with NULs instead of spaces.
pub fn encode_name(name: &str, suffix: u8) -> Result<[u8; ENCODED_NAME_LEN], PacketError> {
    if name.len() > MAX_NAME_LEN {
        return Err(PacketError::NameTooLong(name.to_string()));
    }
    let pad: u8 = if name == WILDCARD { 0x00 } else { b' ' };
    let mut raw = [pad; MAX_NAME_LEN + 1];
    for (slot, byte) in raw.iter_mut().zip(name.bytes()) {
        *slot = byte.to_ascii_uppercase();
    }
    raw[MAX_NAME_LEN] = suffix;

    let mut encoded = [0u8; ENCODED_NAME_LEN];
    for (i, byte) in raw.iter().enumerate() {
        encoded[2 * i] = (byte >> 4) + b'A';
        encoded[2 * i + 1] = (byte & 0x0F) + b'A';
    }
    Ok(encoded)
}

/// Reverses [`encode_name`], returning the trimmed name and its suffix.
pub fn decode_name(encoded: &[u8]) -> Result<(String, u8), PacketError> {
    if encoded.len() != ENCODED_NAME_LEN {
        return Err(PacketError::InvalidName);
    }
    let mut raw = [0u8; MAX_NAME_LEN + 1];
    for (i, pair) in encoded.chunks_exact(2).enumerate() {
        let (high, low) = (pair[0], pair[1]);
        if !(b'A'..=b'P').contains(&high) || !(b'A'..=b'P').contains(&low) {
            return Err(PacketError::InvalidName);
        }
        raw[i] = ((high - b'A') << 4) | (low - b'A');
    }
    Ok((trim_name(&raw[..MAX_NAME_LEN]), raw[MAX_NAME_LEN]))
}

/// Builds the broadcast node-status request for `*`.
pub fn create_node_status_query(transaction_id: u16) -> Vec<u8> {
    let mut packet: Vec<u8> = Vec::with_capacity(HEADER_LEN + ENCODED_NAME_LEN + 6);
    write_header(&mut packet, transaction_id, FLAG_BROADCAST, 1, 0);
    write_wildcard(&mut packet);
    packet.extend_from_slice(&NBSTAT.to_be_bytes());
    packet.extend_from_slice(&CLASS_IN.to_be_bytes());
    packet
}

/// Builds the reply a node sends to a node-status request.
pub fn create_node_status_response(
    transaction_id: u16,
    names: &[NodeName],
) -> Result<Vec<u8>, PacketError> {
    let count: u8 = u8::try_from(names.len()).map_err(|_| PacketError::TooManyNames(names.len()))?;
    let rdlength: usize = 1 + names.len() * NAME_ENTRY_LEN + STATISTICS_LEN;

    let mut packet: Vec<u8> = Vec::with_capacity(HEADER_LEN + ENCODED_NAME_LEN + 12 + rdlength);
    write_header(&mut packet, transaction_id, FLAG_RESPONSE | FLAG_AUTHORITATIVE, 0, 1);
    write_wildcard(&mut packet);
    packet.extend_from_slice(&NBSTAT.to_be_bytes());
    packet.extend_from_slice(&CLASS_IN.to_be_bytes());
    packet.extend_from_slice(&0u32.to_be_bytes()); // ttl
    packet.extend_from_slice(&(rdlength as u16).to_be_bytes());

    packet.push(count);
    for entry in names {
        if entry.name.len() > MAX_NAME_LEN {
            return Err(PacketError::NameTooLong(entry.name.clone()));
        }
        let mut raw = [b' '; MAX_NAME_LEN];
        raw[..entry.name.len()].copy_from_slice(entry.name.to_ascii_uppercase().as_bytes());
        packet.extend_from_slice(&raw);
        packet.push(entry.suffix);
        let mut flags: u16 = NAME_FLAG_ACTIVE;
        if entry.group {
            flags |= NAME_FLAG_GROUP;
        }
        packet.extend_from_slice(&flags.to_be_bytes());
    }
    packet.extend_from_slice(&[0u8; STATISTICS_LEN]);
    Ok(packet)
}

/// Returns the transaction id of a datagram without validating the rest.
pub fn transaction_id(data: &[u8]) -> Option<u16> {
    data.get(..2).map(|b| u16::from_be_bytes([b[0], b[1]]))
}

/// Checks that a datagram is a node-status request and returns its
/// transaction id.
pub fn parse_node_status_query(data: &[u8]) -> Result<u16, PacketError> {
    let mut reader = Reader::new(data);
    let transaction_id: u16 = reader.u16()?;
    if reader.u16()? & FLAG_RESPONSE != 0 {
        return Err(PacketError::NotARequest);
    }
    if reader.u16()? == 0 {
        return Err(PacketError::NoNodeStatus);
    }
    reader.skip(6)?;
    reader.skip_name()?;
    match reader.u16()? {
        NBSTAT => Ok(transaction_id),
        _ => Err(PacketError::NoNodeStatus),
    }
}

/// Parses a node-status reply.
pub fn parse_node_status_response(data: &[u8]) -> Result<NodeStatus, PacketError> {
    let mut reader = Reader::new(data);
    let transaction_id: u16 = reader.u16()?;
    let flags: u16 = reader.u16()?;
    if flags & FLAG_RESPONSE == 0 {
        return Err(PacketError::NotAResponse);
    }
    let question_count: u16 = reader.u16()?;
    let answer_count: u16 = reader.u16()?;
    reader.skip(4)?; // authority + additional counts

    for _ in 0..question_count {
        reader.skip_name()?;
        reader.skip(4)?;
    }

    for _ in 0..answer_count {
        reader.skip_name()?;
        let rtype: u16 = reader.u16()?;
        reader.skip(6)?; // class + ttl
        let rdlength: usize = usize::from(reader.u16()?);
        let rdata: &[u8] = reader.take(rdlength)?;
        if rtype == NBSTAT {
            return Ok(NodeStatus {
                transaction_id,
                names: parse_name_table(rdata)?,
            });
        }
    }

    Err(PacketError::NoNodeStatus)
}

fn parse_name_table(rdata: &[u8]) -> Result<Vec<NodeName>, PacketError> {
    let mut reader = Reader::new(rdata);
    let count: u8 = reader.u8()?;
    let mut names: Vec<NodeName> = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let entry: &[u8] = reader.take(NAME_ENTRY_LEN)?;
        let flags: u16 = u16::from_be_bytes([entry[16], entry[17]]);
        names.push(NodeName {
            name: trim_name(&entry[..MAX_NAME_LEN]),
            suffix: entry[MAX_NAME_LEN],
            group: flags & NAME_FLAG_GROUP != 0,
        });
    }
    Ok(names)
}

fn write_header(packet: &mut Vec<u8>, id: u16, flags: u16, questions: u16, answers: u16) {
    packet.extend_from_slice(&id.to_be_bytes());
    packet.extend_from_slice(&flags.to_be_bytes());
    packet.extend_from_slice(&questions.to_be_bytes());
    packet.extend_from_slice(&answers.to_be_bytes());
    packet.extend_from_slice(&0u16.to_be_bytes()); // authority
    packet.extend_from_slice(&0u16.to_be_bytes()); // additional
}

fn write_wildcard(packet: &mut Vec<u8>) {
    // the wildcard is always encodable
    let encoded = encode_name(WILDCARD, SUFFIX_WORKSTATION).unwrap_or([b'A'; ENCODED_NAME_LEN]);
    packet.push(ENCODED_NAME_LEN as u8);
    packet.extend_from_slice(&encoded);
    packet.push(0);
}

fn trim_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches([' ', '\0'])
        .to_string()
}

struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], PacketError> {
        let end = self.offset.checked_add(n).filter(|end| *end <= self.data.len());
        let Some(end) = end else {
            return Err(PacketError::Truncated {
                offset: self.offset,
                len: self.data.len(),
            });
        };
        let slice = &self.data[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn skip(&mut self, n: usize) -> Result<(), PacketError> {
        self.take(n).map(|_| ())
    }

    fn u8(&mut self) -> Result<u8, PacketError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, PacketError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Skips a label sequence, stopping at the terminator or a compression
    /// pointer.
    fn skip_name(&mut self) -> Result<(), PacketError> {
        loop {
            let len: u8 = self.u8()?;
            match len {
                0 => return Ok(()),
                l if l & 0xC0 == 0xC0 => return self.skip(1),
                l => self.skip(usize::from(l))?,
            }
        }
    }
}
