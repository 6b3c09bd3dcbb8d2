//! DNS query parsing and response construction.
//!
//! Responses are built directly over the wire format so the original
//! question section and transaction id are preserved byte for byte.
//! Only the pieces the filter needs are modeled: the header, the first
//! question, and a single synthesized A answer.

#![allow(clippy::cast_possible_truncation)]

use std::net::Ipv4Addr;

/// DNS header size in bytes.
pub const DNS_HEADER_SIZE: usize = 12;
/// TTL for synthesized answers, in seconds. Short so that unblocking a
/// domain takes effect without waiting out long caches.
pub const BLOCKED_ANSWER_TTL: u32 = 60;

/// Standard response flags: QR, RD, RA, NOERROR.
const FLAGS_NOERROR: u16 = 0x8180;
/// Response flags with RCODE 2 (SERVFAIL).
const FLAGS_SERVFAIL: u16 = 0x8182;
/// Compression pointer to the question name at its fixed offset.
const NAME_POINTER: u16 = 0xC00C;

/// The first question of a DNS query, with enough of the original
/// buffer retained to echo the question section back unchanged.
pub struct DnsQuestion<'a> {
    data: &'a [u8],
    /// Transaction id of the query.
    pub id: u16,
    /// Queried name with labels joined by dots, as it appeared on the
    /// wire. Not normalized; classification handles case and the
    /// trailing dot.
    pub name: String,
    question_end: usize,
}

impl<'a> DnsQuestion<'a> {
    /// Parse the first question of `data`.
    ///
    /// Returns `None` when the buffer is shorter than a DNS header, the
    /// question count is zero, or the name is malformed.
    pub fn parse(data: &'a [u8]) -> Option<Self> {
        if data.len() < DNS_HEADER_SIZE {
            return None;
        }
        let id = u16::from_be_bytes([data[0], data[1]]);
        let question_count = u16::from_be_bytes([data[4], data[5]]);
        if question_count == 0 {
            return None;
        }
        let (name, encoded_len) = parse_name(data, DNS_HEADER_SIZE)?;
        // Name plus QTYPE and QCLASS, clamped to what is actually there.
        let question_end = (DNS_HEADER_SIZE + encoded_len + 4).min(data.len());
        Some(Self {
            data,
            id,
            name,
            question_end,
        })
    }

    /// The question section exactly as received.
    fn question(&self) -> &'a [u8] {
        &self.data[DNS_HEADER_SIZE..self.question_end]
    }

    /// Build a response answering the question with `answer`.
    ///
    /// One question, one A record: the original question echoed, the
    /// answer name a pointer back to it, TTL [`BLOCKED_ANSWER_TTL`].
    #[must_use]
    pub fn blocked_answer(&self, answer: Ipv4Addr) -> Vec<u8> {
        let question = self.question();
        let mut response = Vec::with_capacity(DNS_HEADER_SIZE + question.len() + 16);
        response.extend_from_slice(&self.id.to_be_bytes());
        response.extend_from_slice(&FLAGS_NOERROR.to_be_bytes());
        response.extend_from_slice(&1u16.to_be_bytes()); // QDCOUNT
        response.extend_from_slice(&1u16.to_be_bytes()); // ANCOUNT
        response.extend_from_slice(&0u16.to_be_bytes()); // NSCOUNT
        response.extend_from_slice(&0u16.to_be_bytes()); // ARCOUNT
        response.extend_from_slice(question);
        response.extend_from_slice(&NAME_POINTER.to_be_bytes());
        response.extend_from_slice(&1u16.to_be_bytes()); // TYPE A
        response.extend_from_slice(&1u16.to_be_bytes()); // CLASS IN
        response.extend_from_slice(&BLOCKED_ANSWER_TTL.to_be_bytes());
        response.extend_from_slice(&4u16.to_be_bytes()); // RDLENGTH
        response.extend_from_slice(&answer.octets());
        response
    }

    /// Build a SERVFAIL response echoing the question with no answers.
    #[must_use]
    pub fn servfail(&self) -> Vec<u8> {
        let question = self.question();
        let mut response = Vec::with_capacity(DNS_HEADER_SIZE + question.len());
        response.extend_from_slice(&self.id.to_be_bytes());
        response.extend_from_slice(&FLAGS_SERVFAIL.to_be_bytes());
        response.extend_from_slice(&1u16.to_be_bytes()); // QDCOUNT
        response.extend_from_slice(&0u16.to_be_bytes()); // ANCOUNT
        response.extend_from_slice(&0u16.to_be_bytes()); // NSCOUNT
        response.extend_from_slice(&0u16.to_be_bytes()); // ARCOUNT
        response.extend_from_slice(question);
        response
    }
}

/// Walk the label sequence at `start`, returning the dotted name and
/// the number of bytes the name occupies at that position.
///
/// At most one compression pointer is followed; a second pointer after
/// a jump is treated as malformed, so a self-referencing name cannot
/// loop the parser.
fn parse_name(data: &[u8], start: usize) -> Option<(String, usize)> {
    let mut labels: Vec<String> = Vec::new();
    let mut pos = start;
    let mut encoded_len = 0;
    let mut jumped = false;

    loop {
        let len = usize::from(*data.get(pos)?);
        if len & 0xC0 == 0xC0 {
            if jumped {
                return None;
            }
            let low = usize::from(*data.get(pos + 1)?);
            // The pointer ends the name at the original position.
            encoded_len += 2;
            pos = ((len & 0x3F) << 8) | low;
            jumped = true;
        } else if len == 0 {
            if !jumped {
                encoded_len += 1;
            }
            break;
        } else {
            let label = data.get(pos + 1..pos + 1 + len)?;
            labels.push(String::from_utf8_lossy(label).into_owned());
            if !jumped {
                encoded_len += 1 + len;
            }
            pos += 1 + len;
        }
    }

    Some((labels.join("."), encoded_len))
}
