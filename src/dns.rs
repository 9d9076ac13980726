//! DNS wire format helpers.
//!
//! The relay never decodes a full message. It reads the transaction ID and
//! the queried name out of a raw query, and builds the two synthetic replies
//! it can answer locally (blocked and SERVFAIL) by copying the original
//! question section verbatim.

/// Size of the fixed DNS header; the question section starts here.
pub const HEADER_LEN: usize = 12;

/// Largest datagram accepted from clients or upstream.
pub const MAX_DNS_PACKET_SIZE: usize = 512;

/// Response, recursion desired, recursion available, NOERROR.
pub const FLAGS_NOERROR: u16 = 0x8180;

/// Response, recursion desired, recursion available, SERVFAIL.
pub const FLAGS_SERVFAIL: u16 = 0x8182;

/// TTL handed to clients for the sinkhole answer.
pub const BLOCKED_TTL: u32 = 60;

/// Address returned for blocked names.
pub const BLOCKED_ADDR: [u8; 4] = [0, 0, 0, 0];

/// Compression pointer to the question name at offset 12.
const QUESTION_NAME_POINTER: [u8; 2] = [0xC0, 0x0C];

const TYPE_A: u16 = 1;
const CLASS_IN: u16 = 1;

/// Returns the two transaction ID bytes of a message.
///
/// Messages shorter than two bytes yield zeros for the missing bytes.
pub fn transaction_id(message: &[u8]) -> [u8; 2] {
    [
        message.first().copied().unwrap_or(0),
        message.get(1).copied().unwrap_or(0),
    ]
}

/// Returns everything after the header: name, type and class of the question.
pub fn question(message: &[u8]) -> &[u8] {
    message.get(HEADER_LEN..).unwrap_or(&[])
}

/// Extract the queried domain name from a raw query.
///
/// Labels are read from offset 12 until a zero length byte. A label that
/// would run past the end of the buffer stops parsing, and the labels read
/// so far are returned, so a malformed query yields a partial (possibly
/// empty) name rather than an error. Label bytes are not validated; invalid
/// UTF-8 is replaced lossily.
pub fn parse_domain(query: &[u8]) -> String {
    let mut pos = HEADER_LEN;
    let mut labels: Vec<String> = Vec::new();

    while let Some(&len) = query.get(pos) {
        if len == 0 {
            break;
        }
        pos += 1;
        let end = pos + len as usize;
        let Some(label) = query.get(pos..end) else {
            break;
        };
        labels.push(String::from_utf8_lossy(label).into_owned());
        pos = end;
    }

    labels.join(".")
}

/// Build the sinkhole reply for a blocked query.
///
/// One answer: an A record for the question name (via a compression pointer)
/// pointing at 0.0.0.0.
pub fn blocked_response(query: &[u8]) -> Vec<u8> {
    let question = question(query);
    let mut response = Vec::with_capacity(HEADER_LEN + question.len() + 16);

    write_header(&mut response, query, FLAGS_NOERROR, 1);
    response.extend_from_slice(question);

    response.extend_from_slice(&QUESTION_NAME_POINTER);
    response.extend_from_slice(&TYPE_A.to_be_bytes());
    response.extend_from_slice(&CLASS_IN.to_be_bytes());
    response.extend_from_slice(&BLOCKED_TTL.to_be_bytes());
    response.extend_from_slice(&(BLOCKED_ADDR.len() as u16).to_be_bytes());
    response.extend_from_slice(&BLOCKED_ADDR);

    response
}

/// Build a SERVFAIL reply echoing the original question and no answers.
pub fn servfail_response(query: &[u8]) -> Vec<u8> {
    let question = question(query);
    let mut response = Vec::with_capacity(HEADER_LEN + question.len());

    write_header(&mut response, query, FLAGS_SERVFAIL, 0);
    response.extend_from_slice(question);

    response
}

fn write_header(buf: &mut Vec<u8>, query: &[u8], flags: u16, ancount: u16) {
    buf.extend_from_slice(&transaction_id(query));
    buf.extend_from_slice(&flags.to_be_bytes());
    buf.extend_from_slice(&1u16.to_be_bytes()); // QDCOUNT
    buf.extend_from_slice(&ancount.to_be_bytes());
    buf.extend_from_slice(&[0x00, 0x00]); // NSCOUNT
    buf.extend_from_slice(&[0x00, 0x00]); // ARCOUNT
}
