use std::fmt::{self, Debug, Display, Formatter};
use std::net::{Ipv4Addr, Ipv6Addr};

use bytes::{BufMut, Bytes};
use thiserror::Error;

// Header flag bits.
const QR: u16 = 1 << 15;
const AA: u16 = 1 << 10;
const TC: u16 = 1 << 9;
const RD: u16 = 1 << 8;
const RA: u16 = 1 << 7;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Qr {
    Request,
    Response,
}

#[derive(Clone, Debug)]
pub struct Packet {
    pub transaction_id: u16,
    pub qr: Qr,
    pub opcode: OpCode,
    pub authoritative_answer: bool,
    pub truncated: bool,
    pub recursion_desired: bool,
    pub recursion_available: bool,
    pub response_code: ResponseCode,
    pub questions: Vec<Question>,
    pub answers: Vec<ResourceRecord>,
    pub authority: Vec<ResourceRecord>,
    pub additional: Vec<ResourceRecord>,
}

impl Packet {
    /// Creates a recursive query for a single [`Question`].
    pub fn query(transaction_id: u16, question: Question) -> Self {
        Self {
            transaction_id,
            qr: Qr::Request,
            opcode: OpCode::Query,
            authoritative_answer: false,
            truncated: false,
            recursion_desired: true,
            recursion_available: false,
            response_code: ResponseCode::Ok,
            questions: vec![question],
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
        }
    }

    /// Creates an empty response to `request` with the given code.
    ///
    /// The transaction id, opcode, questions and `RD` flag are copied from the request.
    pub fn response_to(request: &Packet, response_code: ResponseCode) -> Self {
        Self {
            transaction_id: request.transaction_id,
            qr: Qr::Response,
            opcode: request.opcode,
            authoritative_answer: false,
            truncated: false,
            recursion_desired: request.recursion_desired,
            recursion_available: false,
            response_code,
            questions: request.questions.clone(),
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
        }
    }

    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = Reader::new(buf);

        let mut header = [0; 6];
        for field in &mut header {
            *field = u16::decode(&mut reader)?;
        }
        let [transaction_id, flags, qdcount, ancount, nscount, arcount] = header;

        let opcode = OpCode::from_u16((flags >> 11) & 0xf).ok_or(DecodeError::InvalidOpCode)?;
        let response_code =
            ResponseCode::from_u16(flags & 0xf).ok_or(DecodeError::InvalidResponseCode)?;

        let questions = (0..qdcount)
            .map(|_| Question::decode(&mut reader))
            .collect::<Result<Vec<_>, _>>()?;
        let answers = ResourceRecord::decode_many(&mut reader, ancount)?;
        let authority = ResourceRecord::decode_many(&mut reader, nscount)?;
        let additional = ResourceRecord::decode_many(&mut reader, arcount)?;

        Ok(Self {
            transaction_id,
            qr: match flags & QR {
                0 => Qr::Request,
                _ => Qr::Response,
            },
            opcode,
            authoritative_answer: flags & AA != 0,
            truncated: flags & TC != 0,
            recursion_desired: flags & RD != 0,
            recursion_available: flags & RA != 0,
            response_code,
            questions,
            answers,
            authority,
            additional,
        })
    }

    pub fn encode<B>(&self, mut buf: B)
    where
        B: BufMut,
    {
        let mut flags = (self.opcode.to_u16() << 11) | self.response_code.to_u16();
        for (set, bit) in [
            (self.qr == Qr::Response, QR),
            (self.authoritative_answer, AA),
            (self.truncated, TC),
            (self.recursion_desired, RD),
            (self.recursion_available, RA),
        ] {
            if set {
                flags |= bit;
            }
        }

        for field in [
            self.transaction_id,
            flags,
            self.questions.len() as u16,
            self.answers.len() as u16,
            self.authority.len() as u16,
            self.additional.len() as u16,
        ] {
            buf.put_u16(field);
        }

        for question in &self.questions {
            question.encode(&mut buf);
        }

        for record in self
            .answers
            .iter()
            .chain(&self.authority)
            .chain(&self.additional)
        {
            record.encode(&mut buf);
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Question {
    pub name: Fqdn,
    pub qtype: Type,
    pub qclass: Class,
}

impl Question {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            name: Fqdn::decode(reader)?,
            qtype: Type::from_bits(u16::decode(reader)?),
            qclass: Class::from_bits(u16::decode(reader)?),
        })
    }

    fn encode<B>(&self, mut buf: B)
    where
        B: BufMut,
    {
        self.name.encode(&mut buf);
        buf.put_u16(self.qtype.to_bits());
        buf.put_u16(self.qclass.to_bits());
    }
}

/// A domain name in dotted form, exactly as it appeared on the wire.
///
/// No case folding is performed.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Fqdn(pub Vec<u8>);

impl Fqdn {
    pub fn new_unchecked(fqdn: String) -> Self {
        Self(fqdn.into_bytes())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    fn labels(&self) -> impl Iterator<Item = &[u8]> {
        self.0.split(|b| *b == b'.').filter(|label| !label.is_empty())
    }
}

impl Encode for Fqdn {
    fn encode<B>(&self, mut buf: B)
    where
        B: BufMut,
    {
        for label in self.labels() {
            buf.put_u8(label.len() as u8);
            buf.put_slice(label);
        }

        buf.put_u8(0);
    }

    fn len(&self) -> u16 {
        self.labels().map(|label| label.len() as u16 + 1).sum::<u16>() + 1
    }
}

impl Decode for Fqdn {
    /// Decodes a possibly compressed name.
    ///
    /// The reader is only advanced past the bytes of the name at its current position,
    /// never past the labels that compression pointers lead to.
    fn decode(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        // Pointers may lead to other pointers or back to themselves. Both
        // budgets keep a crafted message from looping forever.
        const MAX_LABELS: usize = 64;
        const MAX_POINTERS: usize = 16;

        let message = reader.message();
        let mut pos = reader.cursor;
        // Where the name ends at the reader's position, known once the first pointer is seen.
        let mut end = None;

        let mut name = Vec::new();
        let mut labels = 0;
        let mut pointers = 0;

        loop {
            let len = *message.get(pos).ok_or(DecodeError::Eof)?;

            match len & 0b1100_0000 {
                0b0000_0000 if len == 0 => {
                    reader.cursor = end.unwrap_or(pos + 1);
                    break;
                }
                0b0000_0000 => {
                    let label = message
                        .get(pos + 1..pos + 1 + usize::from(len))
                        .ok_or(DecodeError::Eof)?;

                    // Names are stored dotted, a '.' inside a label is ambiguous.
                    if label.contains(&b'.') {
                        return Err(DecodeError::InvalidLabel);
                    }

                    labels += 1;
                    if labels == MAX_LABELS {
                        return Err(DecodeError::FqdnTooLong);
                    }

                    name.extend_from_slice(label);
                    name.push(b'.');
                    pos += 1 + usize::from(len);
                }
                0b1100_0000 => {
                    let low = *message.get(pos + 1).ok_or(DecodeError::Eof)?;

                    pointers += 1;
                    if pointers > MAX_POINTERS {
                        return Err(DecodeError::BadPointer);
                    }

                    end.get_or_insert(pos + 2);
                    pos = usize::from(u16::from_be_bytes([len & 0b0011_1111, low]));
                }
                // Extended and reserved label types (RFC 6891).
                _ => return Err(DecodeError::InvalidLabel),
            }
        }

        if name.is_empty() {
            name.push(b'.');
        }

        Ok(Self(name))
    }
}

impl Debug for Fqdn {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Fqdn({:?})", String::from_utf8_lossy(self.as_bytes()))
    }
}

impl Display for Fqdn {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.as_bytes()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordData {
    A(Ipv4Addr),
    NS(Fqdn),
    CNAME(Fqdn),
    SOA(SoaData),
    PTR(Fqdn),
    MX(MxData),
    AAAA(Ipv6Addr),
    /// Any type without a structured representation, kept as raw rdata.
    Other(Type, Bytes),
}

impl RecordData {
    fn decode(len: u16, typ: Type, reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let start = reader.cursor;

        let data = match typ {
            Type::A => Self::A(Ipv4Addr::decode(reader)?),
            Type::NS => Self::NS(Fqdn::decode(reader)?),
            Type::CNAME => Self::CNAME(Fqdn::decode(reader)?),
            Type::SOA => Self::SOA(SoaData::decode(reader)?),
            Type::PTR => Self::PTR(Fqdn::decode(reader)?),
            Type::MX => Self::MX(MxData::decode(reader)?),
            Type::AAAA => Self::AAAA(Ipv6Addr::decode(reader)?),
            _ => Self::Other(typ, Bytes::copy_from_slice(reader.take(len.into())?)),
        };

        if reader.cursor - start != usize::from(len) {
            return Err(DecodeError::InvalidRdLength);
        }

        Ok(data)
    }

    fn encode<B>(&self, mut buf: B)
    where
        B: BufMut,
    {
        match self {
            Self::A(data) => data.encode(&mut buf),
            Self::NS(data) | Self::CNAME(data) | Self::PTR(data) => data.encode(&mut buf),
            Self::SOA(data) => data.encode(&mut buf),
            Self::MX(data) => data.encode(&mut buf),
            Self::AAAA(data) => data.encode(&mut buf),
            Self::Other(_, data) => buf.put_slice(data),
        }
    }

    pub fn len(&self) -> u16 {
        match self {
            Self::A(data) => data.len(),
            Self::NS(data) | Self::CNAME(data) | Self::PTR(data) => data.len(),
            Self::SOA(data) => data.len(),
            Self::MX(data) => data.len(),
            Self::AAAA(data) => data.len(),
            Self::Other(_, data) => data.len() as u16,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Type(u16);

impl Type {
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub const fn to_bits(&self) -> u16 {
        self.0
    }

    /// IPv4 address record.
    ///
    /// Specified in [RFC 1035](https://datatracker.ietf.org/doc/html/rfc1035).
    pub const A: Self = Self(1);
    /// Nameserver record.
    ///
    /// Specified in [RFC 1035](https://datatracker.ietf.org/doc/html/rfc1035).
    pub const NS: Self = Self(2);
    /// Canonical name record.
    ///
    /// Specified in [RFC 1035](https://datatracker.ietf.org/doc/html/rfc1035).
    pub const CNAME: Self = Self(5);
    /// Start of authority record.
    ///
    /// Specified in [RFC 1035](https://datatracker.ietf.org/doc/html/rfc1035).
    pub const SOA: Self = Self(6);
    /// Domain name pointer record.
    ///
    /// Specified in [RFC 1035](https://datatracker.ietf.org/doc/html/rfc1035).
    pub const PTR: Self = Self(12);
    /// Mail exchange record.
    ///
    /// Specified in [RFC 1035](https://datatracker.ietf.org/doc/html/rfc1035).
    pub const MX: Self = Self(15);
    /// IPv6 address record.
    ///
    /// Specified in [RFC 3596](https://datatracker.ietf.org/doc/html/rfc3596).
    pub const AAAA: Self = Self(28);
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Class(u16);

impl Class {
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub const fn to_bits(&self) -> u16 {
        self.0
    }

    /// The Internet.
    pub const IN: Self = Self(1);
}

macro_rules! enum_as_int {
    ($id:ident, $($int:tt => $val:tt),*,) => {
        impl $id {
            pub fn from_u16(tag: u16) -> Option<Self> {
                match tag {
                    $(
                        $int => Some(Self::$val),
                    )*
                    _ => None,
                }
            }

            pub fn to_u16(self) -> u16 {
                match self {
                    $(
                        Self::$val => $int,
                    )*
                }
            }

        }
    };
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum OpCode {
    Query,
    InverseQuery,
    Status,
    Notify,
    Update,
}

enum_as_int! {
    OpCode,
    0 => Query,
    1 => InverseQuery,
    2 => Status,
    4 => Notify,
    5 => Update,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceRecord {
    pub name: Fqdn,
    pub r#type: Type,
    pub class: Class,
    pub ttl: u32,
    pub rdata: RecordData,
}

impl ResourceRecord {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let name = Fqdn::decode(reader)?;
        let r#type = Type::from_bits(u16::decode(reader)?);
        let class = Class::from_bits(u16::decode(reader)?);
        let ttl = u32::decode(reader)?;
        let rdlength = u16::decode(reader)?;

        Ok(Self {
            name,
            r#type,
            class,
            ttl,
            rdata: RecordData::decode(rdlength, r#type, reader)?,
        })
    }

    fn decode_many(reader: &mut Reader<'_>, count: u16) -> Result<Vec<Self>, DecodeError> {
        // `count` comes from the wire, don't trust it for the allocation.
        let mut records = Vec::with_capacity(usize::from(count).min(64));
        for _ in 0..count {
            records.push(Self::decode(reader)?);
        }

        Ok(records)
    }

    /// Decodes `count` records from the start of `buf`, returning them with the number
    /// of bytes consumed.
    ///
    /// Compression pointers in `buf` are resolved relative to the start of `buf`.
    pub fn decode_records(buf: &[u8], count: u16) -> Result<(Vec<Self>, usize), DecodeError> {
        let mut reader = Reader::new(buf);
        let records = Self::decode_many(&mut reader, count)?;
        Ok((records, reader.cursor))
    }

    /// Encodes the record in wire form without name compression.
    pub fn encode<B>(&self, mut buf: B)
    where
        B: BufMut,
    {
        self.name.encode(&mut buf);
        buf.put_u16(self.r#type.to_bits());
        buf.put_u16(self.class.to_bits());
        buf.put_u32(self.ttl);
        buf.put_u16(self.rdata.len());
        self.rdata.encode(&mut buf);
    }

    pub fn encoded_len(&self) -> usize {
        usize::from(self.name.len()) + 10 + usize::from(self.rdata.len())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    Ok,
    FormatError,
    ServerFailure,
    NameError,
    NotImplemented,
    Refused,
    YxDomain,
    YxRrSet,
    NxRrSet,
    NotAuth,
    NotZone,
}

enum_as_int! {
    ResponseCode,
    0 => Ok,
    1 => FormatError,
    2 => ServerFailure,
    3 => NameError,
    4 => NotImplemented,
    5 => Refused,
    6 => YxDomain,
    7 => YxRrSet,
    8 => NxRrSet,
    9 => NotAuth,
    10 => NotZone,
}

#[derive(Clone, Debug, Error)]
pub enum DecodeError {
    #[error("unexpected end of message")]
    Eof,
    #[error("invalid opcode")]
    InvalidOpCode,
    #[error("invalid response code")]
    InvalidResponseCode,
    #[error("rdata length does not match record contents")]
    InvalidRdLength,
    #[error("invalid name compression pointer")]
    BadPointer,
    #[error("invalid label")]
    InvalidLabel,
    #[error("domain name has too many labels")]
    FqdnTooLong,
}

/// A cursor over a complete message.
///
/// Compressed names may point anywhere into the message, so the reader keeps all of it
/// instead of only the unread part.
#[derive(Clone, Debug)]
struct Reader<'a> {
    buf: &'a [u8],
    cursor: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, cursor: 0 }
    }

    fn message(&self) -> &'a [u8] {
        self.buf
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let bytes = self
            .buf
            .get(self.cursor..self.cursor + n)
            .ok_or(DecodeError::Eof)?;
        self.cursor += n;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut array = [0; N];
        array.copy_from_slice(self.take(N)?);
        Ok(array)
    }
}

macro_rules! define_record {
    ($struct_vis:vis struct $struct_name:ident {
        $($field_vis:vis $field_name:ident: $field_type:ty,)*
    }) => {
        #[derive(Clone, Debug, PartialEq, Eq)]
        $struct_vis struct $struct_name {
            $(
                $field_vis $field_name: $field_type,
            )*
        }

        impl Encode for $struct_name {
            fn encode<B>(&self, mut buf: B)
            where
                B: BufMut,
            {
                $(
                    self.$field_name.encode(&mut buf);
                )*
            }

            fn len(&self) -> u16 {
                0 $( + self.$field_name.len() )*
            }
        }

        impl Decode for $struct_name {
            fn decode(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
                $(
                    let $field_name = <$field_type as Decode>::decode(reader)?;
                )*

                Ok(Self {
                    $(
                        $field_name,
                    )*
                })
            }
        }
    };
}

define_record! {
    pub struct SoaData {
        pub mname: Fqdn,
        pub rname: Fqdn,
        pub serial: u32,
        pub refresh: u32,
        pub retry: u32,
        pub expire: u32,
        pub minimum: u32,
    }
}

define_record! {
    pub struct MxData {
        pub preference: u16,
        pub exchange: Fqdn,
    }
}

trait Encode {
    fn encode<B>(&self, buf: B)
    where
        B: BufMut;

    /// Length of the encoded value in bytes.
    fn len(&self) -> u16;
}

trait Decode: Sized {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, DecodeError>;
}

macro_rules! int_codec {
    ($($int:ty),*) => {
        $(
            impl Encode for $int {
                fn encode<B>(&self, mut buf: B)
                where
                    B: BufMut,
                {
                    buf.put_slice(&self.to_be_bytes());
                }

                fn len(&self) -> u16 {
                    size_of::<$int>() as u16
                }
            }

            impl Decode for $int {
                fn decode(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
                    reader.take_array().map(<$int>::from_be_bytes)
                }
            }
        )*
    };
}

int_codec!(u8, u16, u32);

impl Encode for Ipv4Addr {
    fn encode<B>(&self, mut buf: B)
    where
        B: BufMut,
    {
        buf.put_slice(&self.octets());
    }

    fn len(&self) -> u16 {
        4
    }
}

impl Decode for Ipv4Addr {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        reader.take_array::<4>().map(Self::from)
    }
}

impl Encode for Ipv6Addr {
    fn encode<B>(&self, mut buf: B)
    where
        B: BufMut,
    {
        buf.put_slice(&self.octets());
    }

    fn len(&self) -> u16 {
        16
    }
}

impl Decode for Ipv6Addr {
    fn decode(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        reader.take_array::<16>().map(Self::from)
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::{
        Class, Decode, DecodeError, Fqdn, OpCode, Packet, Qr, Question, Reader, RecordData,
        ResourceRecord, ResponseCode, Type,
    };

    fn decode_name(input: &[u8], start: usize) -> (Result<Fqdn, DecodeError>, usize) {
        let mut reader = Reader::new(input);
        reader.cursor = start;
        let res = Fqdn::decode(&mut reader);
        (res, reader.cursor)
    }

    #[test]
    fn fqdn_decode_plain() {
        let input = b"\x06dns-fw\x04test\x00";

        let (fqdn, end) = decode_name(input, 0);
        assert_eq!(fqdn.unwrap().to_string(), "dns-fw.test.");
        assert_eq!(end, input.len());
    }

    #[test]
    fn fqdn_decode_root() {
        let (fqdn, end) = decode_name(b"\x00", 0);
        assert_eq!(fqdn.unwrap().to_string(), ".");
        assert_eq!(end, 1);
    }

    #[test]
    fn fqdn_decode_follows_pointer() {
        // "mail" followed by a pointer to "dns-fw.test." at offset 0.
        let input = b"\x06dns-fw\x04test\x00\x04mail\xc0\x00";

        let (fqdn, end) = decode_name(input, 13);
        assert_eq!(fqdn.unwrap().to_string(), "mail.dns-fw.test.");
        // Only the bytes at the original position are consumed.
        assert_eq!(end, input.len());
    }

    #[test]
    fn fqdn_pointer_loop() {
        // A label without terminator whose continuation points back at itself.
        let input = b"\x04loop\xc0\x00";
        let (fqdn, _) = decode_name(input, 5);
        assert!(matches!(fqdn, Err(DecodeError::BadPointer)));

        let (fqdn, _) = decode_name(b"\xc0\x00", 0);
        assert!(matches!(fqdn, Err(DecodeError::BadPointer)));
    }

    #[test]
    fn fqdn_reserved_label_type() {
        let (fqdn, _) = decode_name(b"\x41abc\x00", 0);
        assert!(matches!(fqdn, Err(DecodeError::InvalidLabel)));
    }

    #[test]
    fn fqdn_dot_in_label() {
        // A single label "a.b" must not turn into the two labels "a" and "b".
        let (fqdn, _) = decode_name(b"\x03a.b\x04test\x00", 0);
        assert!(matches!(fqdn, Err(DecodeError::InvalidLabel)));

        let (fqdn, _) = decode_name(b"\x01.\x00", 0);
        assert!(matches!(fqdn, Err(DecodeError::InvalidLabel)));
    }

    #[test]
    fn fqdn_truncated() {
        let (fqdn, _) = decode_name(b"\x06dns", 0);
        assert!(matches!(fqdn, Err(DecodeError::Eof)));
    }

    #[test]
    fn fqdn_preserves_case() {
        let (fqdn, _) = decode_name(b"\x03WwW\x00", 0);
        assert_eq!(fqdn.unwrap().to_string(), "WwW.");
    }

    #[test]
    fn packet_decode() {
        let payload = [
            0x66, 0xe1, 0x81, 0x80, 0x00, 0x01, 0x00, 0x05, 0x00, 0x00, 0x00, 0x00, 0x03, 0x77,
            0x77, 0x77, 0x06, 0x74, 0x77, 0x69, 0x74, 0x63, 0x68, 0x02, 0x74, 0x76, 0x00, 0x00,
            0x01, 0x00, 0x01, 0xc0, 0x0c, 0x00, 0x05, 0x00, 0x01, 0x00, 0x00, 0x0d, 0x0f, 0x00,
            0x17, 0x06, 0x74, 0x77, 0x69, 0x74, 0x63, 0x68, 0x03, 0x6d, 0x61, 0x70, 0x06, 0x66,
            0x61, 0x73, 0x74, 0x6c, 0x79, 0x03, 0x6e, 0x65, 0x74, 0x00, 0xc0, 0x2b, 0x00, 0x01,
            0x00, 0x01, 0x00, 0x00, 0x00, 0x2b, 0x00, 0x04, 0x97, 0x65, 0x02, 0xa7, 0xc0, 0x2b,
            0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x2b, 0x00, 0x04, 0x97, 0x65, 0xc2, 0xa7,
            0xc0, 0x2b, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x2b, 0x00, 0x04, 0x97, 0x65,
            0x82, 0xa7, 0xc0, 0x2b, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x2b, 0x00, 0x04,
            0x97, 0x65, 0x42, 0xa7,
        ];

        let packet = Packet::decode(&payload[..]).unwrap();
        assert_eq!(packet.transaction_id, 0x66e1);
        assert_eq!(packet.qr, Qr::Response);
        assert_eq!(packet.opcode, OpCode::Query);
        assert!(packet.recursion_desired);
        assert!(packet.recursion_available);
        assert_eq!(packet.response_code, ResponseCode::Ok);
        assert_eq!(packet.questions.len(), 1);
        assert_eq!(packet.questions[0].name.to_string(), "www.twitch.tv.");
        assert_eq!(packet.answers.len(), 5);

        assert_eq!(packet.answers[0].r#type, Type::CNAME);
        assert_eq!(packet.answers[0].ttl, 0x0d0f);
        assert_eq!(
            packet.answers[0].rdata,
            RecordData::CNAME(Fqdn::new_unchecked("twitch.map.fastly.net.".to_owned()))
        );
        assert_eq!(
            packet.answers[1].rdata,
            RecordData::A(Ipv4Addr::new(151, 101, 2, 167))
        );
    }

    #[test]
    fn packet_decode_truncated_header() {
        Packet::decode(&[0x12, 0x34, 0x01]).unwrap_err();
    }

    #[test]
    fn packet_encode_response() {
        let question = Question {
            name: Fqdn::new_unchecked("example.test.".to_owned()),
            qtype: Type::A,
            qclass: Class::IN,
        };
        let request = Packet::query(0xbeef, question.clone());

        let mut response = Packet::response_to(&request, ResponseCode::Ok);
        response.recursion_available = true;
        response.answers.push(ResourceRecord {
            name: question.name.clone(),
            r#type: Type::A,
            class: Class::IN,
            ttl: 300,
            rdata: RecordData::A(Ipv4Addr::new(93, 184, 216, 34)),
        });

        let mut buf = Vec::new();
        response.encode(&mut buf);

        // Header: id, QR|RD|RA, 1 question, 1 answer.
        assert_eq!(&buf[..12], &[0xbe, 0xef, 0x81, 0x80, 0, 1, 0, 1, 0, 0, 0, 0]);

        let decoded = Packet::decode(&buf).unwrap();
        assert_eq!(decoded.transaction_id, 0xbeef);
        assert_eq!(decoded.qr, Qr::Response);
        assert_eq!(decoded.questions, vec![question]);
        assert_eq!(decoded.answers, response.answers);
    }

    #[test]
    fn unknown_type_keeps_rdata() {
        let record = ResourceRecord {
            name: Fqdn::new_unchecked("example.test.".to_owned()),
            r#type: Type::from_bits(16),
            class: Class::IN,
            ttl: 60,
            rdata: RecordData::Other(Type::from_bits(16), b"\x05hello".to_vec().into()),
        };

        let mut buf = Vec::new();
        record.encode(&mut buf);
        assert_eq!(buf.len(), record.encoded_len());

        let (records, consumed) = ResourceRecord::decode_records(&buf, 1).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(records, vec![record]);
    }

    #[test]
    fn rdlength_mismatch_is_rejected() {
        let mut buf = Vec::new();
        ResourceRecord {
            name: Fqdn::new_unchecked("a.".to_owned()),
            r#type: Type::A,
            class: Class::IN,
            ttl: 1,
            rdata: RecordData::A(Ipv4Addr::LOCALHOST),
        }
        .encode(&mut buf);

        // Claim 5 bytes of rdata for a 4 byte address.
        let rdlength = buf.len() - 6;
        buf[rdlength + 1] = 5;
        buf.push(0);

        ResourceRecord::decode_records(&buf, 1).unwrap_err();
    }
}
