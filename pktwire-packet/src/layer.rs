//! Generic header codec shared by every protocol
//!
//! A [`Layer`] holds the decoded fields of one protocol header together with
//! what follows it: either a nested [`Packet`] or an opaque raw payload. The
//! encode and decode algorithms are written once here and driven by the
//! protocol's [`HeaderSchema`]; protocols customise them through the hooks of
//! the [`Protocol`] trait.
//!
//! Decoding a layer:
//!
//! 1. read every schema field at `bit_offset + field offset`, asking the
//!    protocol for the field's width (variable fields) and whether the value
//!    selects the payload's protocol
//! 2. decode the remaining bits as the selected protocol, or keep them raw
//! 3. run the post-decode hook (checksum verification)
//!
//! Encoding is the mirror image: serialize the payload, lay out the header in
//! front of it, write every present field, then run the post-encode hook
//! (length and checksum patch-up).

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use bytes::{Bytes, BytesMut};
use pktwire_core::bits::{self, bytes_for_bits, read_bits, write_bits, BITS_PER_BYTE};
use pktwire_core::{Error, Result};
use tracing::{debug, trace, warn};

use crate::fields::{is_zero, values_equivalent, FieldMap};
use crate::packet::{DecodeOptions, Packet, PacketKind};
use crate::schema::{FieldId, FieldKind, FieldSpec, HeaderSchema};

/// Protocol-specific behaviour plugged into the generic codec
///
/// Implemented by a zero-sized marker type per protocol. Only [`schema`] is
/// required; the hooks default to the plain schema-driven behaviour.
///
/// [`schema`]: Protocol::schema
pub trait Protocol: Sized + Send + Sync + 'static {
    /// Field identifiers of the header
    type Field: FieldId;

    /// Protocol name used in logs and errors
    const NAME: &'static str;

    /// Header layout, built once and shared
    fn schema() -> &'static HeaderSchema<Self::Field>;

    /// Initial field values of a packet created with [`Layer::new`]
    fn defaults(_layer: &mut Layer<Self>) {}

    /// Bit width of a field in this particular packet. Variable-length
    /// fields compute it from fields decoded before them.
    fn field_width(_layer: &Layer<Self>, spec: &FieldSpec<Self::Field>) -> usize {
        spec.bit_width()
    }

    /// How many of the `available_bits` after the header belong to this
    /// packet. The rest is kept verbatim as the layer's trailer, e.g. link
    /// padding behind a length-delimited datagram.
    fn payload_bits(_layer: &Layer<Self>, available_bits: usize) -> usize {
        available_bits
    }

    /// Called after `field` has been decoded. Returns the protocol of the
    /// payload when the field is a type discriminant.
    fn payload_kind(_layer: &Layer<Self>, _field: Self::Field) -> Option<PacketKind> {
        None
    }

    /// Called once the layer and its payload are decoded. `data` is the whole
    /// input buffer and `start` the byte offset of this header in it. A layer
    /// decoded at an unaligned bit offset is handed a realigned copy of its
    /// own bits with `start` 0.
    fn post_decode(_layer: &mut Layer<Self>, _data: &[u8], _start: usize) -> Result<()> {
        Ok(())
    }

    /// Called with the serialized header and payload. May patch fields in
    /// `output`, and must store patched values back into the layer.
    fn post_encode(_layer: &mut Layer<Self>, _output: &mut [u8]) -> Result<()> {
        Ok(())
    }
}

/// One decoded or constructed protocol header plus its payload
pub struct Layer<P: Protocol> {
    fields: FieldMap<P::Field>,
    payload: Option<Box<Packet>>,
    raw_payload: Option<Bytes>,
    trailer: Option<Bytes>,
    corrupted: bool,
    _protocol: PhantomData<fn() -> P>,
}

impl<P: Protocol> Layer<P> {
    /// Create a header with every fixed field zeroed and the protocol's
    /// defaults applied
    pub fn new() -> Self {
        let mut layer = Self::empty();
        for spec in P::schema().fields() {
            if !spec.is_variable() {
                let zero = vec![0u8; spec.declared_storage_size()];
                layer.fields.insert(spec.id(), Bytes::from(zero));
            }
        }
        P::defaults(&mut layer);
        layer
    }

    /// Create a header with no fields at all
    pub fn empty() -> Self {
        Layer {
            fields: FieldMap::new(),
            payload: None,
            raw_payload: None,
            trailer: None,
            corrupted: false,
            _protocol: PhantomData,
        }
    }

    /// Protocol name
    pub fn name(&self) -> &'static str {
        P::NAME
    }

    /// All field values
    pub fn fields(&self) -> &FieldMap<P::Field> {
        &self.fields
    }

    /// Raw value of a field, right-aligned in its storage buffer
    pub fn field(&self, id: P::Field) -> Option<&[u8]> {
        self.fields.get(id).map(|value| &value[..])
    }

    /// Check whether a field is present
    pub fn has_field(&self, id: P::Field) -> bool {
        self.fields.contains(id)
    }

    /// Store a raw field value
    ///
    /// Fixed-width fields must be given exactly their storage size in bytes.
    pub fn set_field(&mut self, id: P::Field, value: impl Into<Bytes>) -> Result<&mut Self> {
        let value = value.into();
        let spec = Self::spec(id)?;
        if !spec.is_variable() && value.len() != spec.declared_storage_size() {
            return Err(Error::invalid_parameter(
                spec.name(),
                format!(
                    "{} field expects {} bytes, got {}",
                    P::NAME,
                    spec.declared_storage_size(),
                    value.len()
                ),
            ));
        }
        self.fields.insert(id, value);
        Ok(self)
    }

    /// Remove a field so it is skipped on encode
    pub fn clear_field(&mut self, id: P::Field) -> &mut Self {
        self.fields.remove(id);
        self
    }

    /// Nested payload packet
    pub fn payload(&self) -> Option<&Packet> {
        self.payload.as_deref()
    }

    /// Mutable nested payload packet
    pub fn payload_mut(&mut self) -> Option<&mut Packet> {
        self.payload.as_deref_mut()
    }

    /// Replace the payload with a nested packet. Any raw payload is dropped.
    pub fn set_payload(&mut self, payload: impl Into<Packet>) -> &mut Self {
        self.payload = Some(Box::new(payload.into()));
        self.raw_payload = None;
        self
    }

    /// Detach and return the nested payload
    pub fn take_payload(&mut self) -> Option<Packet> {
        self.payload.take().map(|packet| *packet)
    }

    /// Undecoded payload bytes
    pub fn raw_payload(&self) -> Option<&Bytes> {
        self.raw_payload.as_ref()
    }

    /// Replace the payload with opaque bytes. Any nested packet is dropped.
    pub fn set_raw_payload(&mut self, raw: impl Into<Bytes>) -> &mut Self {
        self.raw_payload = Some(raw.into());
        self.payload = None;
        self
    }

    /// Remove both the nested and the raw payload
    pub fn clear_payload(&mut self) -> &mut Self {
        self.payload = None;
        self.raw_payload = None;
        self
    }

    /// Bytes that followed this packet's payload on decode without belonging
    /// to it. Serialized verbatim after the payload.
    pub fn trailer(&self) -> Option<&Bytes> {
        self.trailer.as_ref()
    }

    pub fn set_trailer(&mut self, trailer: impl Into<Bytes>) -> &mut Self {
        self.trailer = Some(trailer.into());
        self
    }

    pub fn clear_trailer(&mut self) -> &mut Self {
        self.trailer = None;
        self
    }

    /// True if a verified checksum did not match on decode
    pub fn is_corrupted(&self) -> bool {
        self.corrupted
    }

    pub(crate) fn mark_corrupted(&mut self) {
        self.corrupted = true;
    }

    /// Header size in bits: the sum of the widths of the present fields
    pub fn header_bits(&self) -> usize {
        P::schema()
            .fields()
            .iter()
            .filter(|spec| self.fields.contains(spec.id()))
            .map(|spec| P::field_width(self, spec))
            .sum()
    }

    /// Header size in bytes
    pub fn header_len(&self) -> usize {
        bytes_for_bits(self.header_bits())
    }

    /// Decode the header and its payload from `bit_length` bits of `data`
    /// starting at `bit_offset`
    pub fn decode(&mut self, data: &[u8], bit_offset: usize, bit_length: usize) -> Result<()> {
        self.decode_with(data, bit_offset, bit_length, &DecodeOptions::default())
    }

    /// Decode with explicit options
    pub fn decode_with(
        &mut self,
        data: &[u8],
        bit_offset: usize,
        bit_length: usize,
        options: &DecodeOptions,
    ) -> Result<()> {
        self.decode_at(data, bit_offset, bit_length, options, 0)
    }

    pub(crate) fn decode_at(
        &mut self,
        data: &[u8],
        bit_offset: usize,
        bit_length: usize,
        options: &DecodeOptions,
        depth: usize,
    ) -> Result<()> {
        let available_bits = data.len() * BITS_PER_BYTE;
        if bit_offset
            .checked_add(bit_length)
            .map_or(true, |end| end > available_bits)
        {
            return Err(Error::Truncated {
                protocol: P::NAME,
                bit_offset,
                bit_length,
                available_bits,
            });
        }

        self.fields.clear();
        self.payload = None;
        self.raw_payload = None;
        self.trailer = None;
        self.corrupted = false;

        let mut payload_kind = None;
        let mut header_end = 0;

        for spec in P::schema().fields() {
            let width = P::field_width(self, spec);
            if width == 0 {
                continue;
            }

            let start = bit_offset + spec.bit_offset();
            if spec.bit_offset() + width > bit_length {
                return Err(Error::Decode {
                    protocol: P::NAME,
                    field: spec.name(),
                    byte_offset: start / BITS_PER_BYTE,
                    bit_offset: start,
                    bit_width: width,
                    available_bits: bit_length.saturating_sub(spec.bit_offset()),
                });
            }

            let value = read_bits(data, start, width)?;
            let value = left_pad(value, spec.storage_size(width));
            trace!(
                protocol = P::NAME,
                field = spec.name(),
                bit_offset = start,
                bit_width = width,
                "Decoded field"
            );
            self.fields.insert(spec.id(), value);

            if let Some(kind) = P::payload_kind(self, spec.id()) {
                debug!(
                    protocol = P::NAME,
                    field = spec.name(),
                    payload = %kind,
                    "Selected payload kind"
                );
                payload_kind = Some(kind);
            }
            header_end = header_end.max(spec.bit_offset() + width);
        }

        let payload_offset = bit_offset + header_end;
        let remaining_bits = bit_length - header_end;
        let payload_bits = P::payload_bits(self, remaining_bits).min(remaining_bits);
        let trailer_bits = remaining_bits - payload_bits;
        if trailer_bits > 0 {
            self.trailer = Some(extract(data, payload_offset + payload_bits, trailer_bits)?);
        }
        if payload_bits > 0 {
            match payload_kind {
                Some(kind) if depth + 1 < options.max_depth => {
                    let packet =
                        kind.decode_at(data, payload_offset, payload_bits, options, depth + 1)?;
                    self.payload = Some(Box::new(packet));
                }
                kind => {
                    if let Some(kind) = kind {
                        warn!(
                            protocol = P::NAME,
                            payload = %kind,
                            max_depth = options.max_depth,
                            "Nesting limit reached, keeping payload raw"
                        );
                    }
                    self.raw_payload = Some(extract(data, payload_offset, payload_bits)?);
                }
            }
        }

        if options.verify_checksums {
            if bit_offset % BITS_PER_BYTE == 0 {
                P::post_decode(self, data, bit_offset / BITS_PER_BYTE)?;
            } else {
                // Checksums sum whole bytes starting at the header
                let aligned_bits = bit_length - bit_length % BITS_PER_BYTE;
                let aligned = read_bits(data, bit_offset, aligned_bits)?;
                P::post_decode(self, &aligned, 0)?;
            }
        }

        debug!(
            protocol = P::NAME,
            header_bits = header_end,
            payload_bits,
            trailer_bits,
            corrupted = self.corrupted,
            "Decoded layer"
        );
        Ok(())
    }

    /// Serialize the header and its payload
    ///
    /// The post-encode hook may update length and checksum fields, so a
    /// second call produces the same bytes.
    pub fn serialize(&mut self) -> Result<Bytes> {
        let payload = match (self.payload.as_deref_mut(), &self.raw_payload) {
            (Some(packet), _) => packet.serialize()?,
            (None, Some(raw)) => raw.clone(),
            (None, None) => Bytes::new(),
        };

        let header_bits = self.header_bits();
        let header_len = bytes_for_bits(header_bits);
        let mut output = BytesMut::zeroed(header_len + payload.len());
        output[header_len..].copy_from_slice(&payload);

        for spec in P::schema().fields() {
            let Some(value) = self.fields.get(spec.id()) else {
                continue;
            };

            let width = P::field_width(self, spec);
            let expected = spec.storage_size(width);
            if value.len() != expected {
                return Err(Error::FieldWidth {
                    protocol: P::NAME,
                    field: spec.name(),
                    expected,
                    actual: value.len(),
                });
            }
            if width == 0 {
                continue;
            }
            if spec.bit_offset() + width > header_bits {
                return Err(Error::encode(
                    P::NAME,
                    format!(
                        "field '{}' ends at bit {} past the {}-bit header",
                        spec.name(),
                        spec.bit_offset() + width,
                        header_bits
                    ),
                ));
            }

            write_bits(&mut output, value, spec.bit_offset(), width)?;
            trace!(protocol = P::NAME, field = spec.name(), bit_width = width, "Encoded field");
        }

        P::post_encode(self, &mut output)?;
        if let Some(trailer) = &self.trailer {
            output.extend_from_slice(trailer);
        }

        debug!(
            protocol = P::NAME,
            header_len,
            payload_len = payload.len(),
            "Serialized layer"
        );
        Ok(output.freeze())
    }

    fn spec(id: P::Field) -> Result<&'static FieldSpec<P::Field>> {
        P::schema().spec(id).ok_or_else(|| {
            Error::invalid_parameter(
                id.name(),
                format!("field is not part of the {} header", P::NAME),
            )
        })
    }

    /// Integer value of a field; absent fields read as zero
    pub(crate) fn uint(&self, id: P::Field) -> u64 {
        self.fields.get(id).map_or(0, |value| bits::to_u64(value))
    }

    /// Store an integer, masked to the field's declared width
    pub(crate) fn set_uint(&mut self, id: P::Field, value: u64) -> &mut Self {
        if let Ok(spec) = Self::spec(id) {
            let masked = value & bits::low_mask(spec.bit_width());
            let encoded = bits::from_u64(masked, spec.declared_storage_size());
            self.fields.insert(id, Bytes::from(encoded));
        }
        self
    }

    /// Fixed-size byte field; absent or mis-sized values read as zeros
    pub(crate) fn array<const N: usize>(&self, id: P::Field) -> [u8; N] {
        self.fields
            .get(id)
            .and_then(|value| <[u8; N]>::try_from(&value[..]).ok())
            .unwrap_or([0u8; N])
    }

    pub(crate) fn set_bytes(&mut self, id: P::Field, value: &[u8]) -> &mut Self {
        self.fields.insert(id, Bytes::copy_from_slice(value));
        self
    }

    /// Store an integer field and write it into already serialized bytes
    pub(crate) fn patch_uint(&mut self, output: &mut [u8], id: P::Field, value: u64) -> Result<()> {
        let spec = Self::spec(id)?;
        self.set_uint(id, value);
        if let Some(stored) = self.fields.get(id) {
            write_bits(output, stored, spec.bit_offset(), spec.bit_width())?;
        }
        Ok(())
    }
}

/// Right-align `value` in a buffer of `size` bytes
fn left_pad(value: Vec<u8>, size: usize) -> Bytes {
    if value.len() >= size {
        return Bytes::from(value);
    }
    let mut padded = vec![0u8; size - value.len()];
    padded.extend_from_slice(&value);
    Bytes::from(padded)
}

/// Copy `bit_count` bits starting at `bit_offset` out of `data`
fn extract(data: &[u8], bit_offset: usize, bit_count: usize) -> Result<Bytes> {
    if bit_offset % BITS_PER_BYTE == 0 && bit_count % BITS_PER_BYTE == 0 {
        let start = bit_offset / BITS_PER_BYTE;
        let end = start + bit_count / BITS_PER_BYTE;
        return Ok(Bytes::copy_from_slice(&data[start..end]));
    }
    read_bits(data, bit_offset, bit_count).map(Bytes::from)
}

impl<P: Protocol> Default for Layer<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Protocol> Clone for Layer<P> {
    fn clone(&self) -> Self {
        Layer {
            fields: self.fields.clone(),
            payload: self.payload.clone(),
            raw_payload: self.raw_payload.clone(),
            trailer: self.trailer.clone(),
            corrupted: self.corrupted,
            _protocol: PhantomData,
        }
    }
}

/// Header fields only: the payload does not take part, and an absent field
/// equals an all-zero one.
impl<P: Protocol> PartialEq for Layer<P> {
    fn eq(&self, other: &Self) -> bool {
        P::schema()
            .fields()
            .iter()
            .all(|spec| values_equivalent(self.fields.get(spec.id()), other.fields.get(spec.id())))
    }
}

impl<P: Protocol> Eq for Layer<P> {}

impl<P: Protocol> Hash for Layer<P> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for spec in P::schema().fields() {
            let value = self.fields.get(spec.id());
            match value {
                Some(bytes) if !is_zero(value) => {
                    1u8.hash(state);
                    bytes.hash(state);
                }
                _ => 0u8.hash(state),
            }
        }
    }
}

impl<P: Protocol> fmt::Debug for Layer<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(P::NAME)
            .field("fields", &self.fields)
            .field("payload", &self.payload)
            .field("raw_payload", &self.raw_payload)
            .field("trailer", &self.trailer)
            .field("corrupted", &self.corrupted)
            .finish()
    }
}

impl<P: Protocol> fmt::Display for Layer<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[", P::NAME)?;
        let mut first = true;
        for spec in P::schema().fields() {
            let Some(value) = self.fields.get(spec.id()) else {
                continue;
            };
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            match spec.kind() {
                FieldKind::Number => write!(f, "{}={}", spec.name(), bits::to_u64(value))?,
                FieldKind::Bytes => {
                    write!(f, "{}=", spec.name())?;
                    for byte in value.iter() {
                        write!(f, "{:02x}", byte)?;
                    }
                }
            }
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dot1q::{Dot1q, Dot1qField};
    use crate::udp::{Udp, UdpField};

    #[test]
    fn test_raw_field_access() {
        let mut udp = Udp::new();
        udp.set_field(UdpField::Length, vec![0x00u8, 0x08]).unwrap();
        assert_eq!(udp.length(), 8);
        assert_eq!(udp.field(UdpField::Length), Some(&[0x00, 0x08][..]));

        let err = udp.set_field(UdpField::Length, vec![0x08u8]).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { .. }));
    }

    #[test]
    fn test_sub_byte_fields_use_one_byte_storage() {
        let mut tag = Dot1q::new();
        tag.set_vlan_id(0xABC);
        assert_eq!(tag.field(Dot1qField::Priority).map(<[u8]>::len), Some(1));
        assert_eq!(tag.field(Dot1qField::VlanId), Some(&[0x0A, 0xBC][..]));
    }

    #[test]
    fn test_header_bits_counts_present_fields() {
        let mut udp = Udp::new();
        assert_eq!(udp.header_bits(), 64);
        udp.clear_field(UdpField::Checksum);
        assert_eq!(udp.header_bits(), 48);
        assert_eq!(udp.serialize().unwrap().len(), 6);
        assert_eq!(Udp::empty().header_bits(), 0);
    }

    #[test]
    fn test_missing_middle_field_fails_encode() {
        let mut udp = Udp::new();
        udp.clear_field(UdpField::Length);

        let err = udp.serialize().unwrap_err();
        assert!(err.is_encode());
        assert!(matches!(err, Error::Encode { protocol: "UDP", .. }));
    }

    #[test]
    fn test_payload_replacement() {
        let mut tag = Dot1q::new();
        tag.set_raw_payload(vec![1u8, 2]);
        tag.set_payload(Udp::new());
        assert!(tag.raw_payload().is_none());
        assert!(tag.payload().is_some());

        let taken = tag.take_payload().unwrap();
        assert_eq!(taken.kind(), PacketKind::Udp);
        tag.clear_payload();
        assert!(tag.payload().is_none());
    }

    #[test]
    fn test_decode_resets_previous_state() {
        let mut udp = Udp::with_ports(1, 2);
        udp.set_raw_payload(vec![9u8; 4]);
        udp.decode(&[0x00, 0x07, 0x00, 0x07, 0x00, 0x08, 0x00, 0x00], 0, 64)
            .unwrap();
        assert_eq!(udp.source_port(), 7);
        assert!(udp.raw_payload().is_none());
    }

    #[test]
    fn test_trailer_follows_payload() {
        let mut udp = Udp::with_ports(1, 2);
        udp.set_length(10)
            .set_raw_payload(vec![0xAAu8, 0xBB])
            .set_trailer(vec![0u8; 3]);

        let bytes = udp.serialize().unwrap();
        assert_eq!(bytes.len(), 8 + 2 + 3);
        assert_eq!(&bytes[8..], &[0xAA, 0xBB, 0x00, 0x00, 0x00]);

        let copy = udp.clone();
        assert_eq!(copy.trailer().map(|trailer| trailer.len()), Some(3));

        udp.clear_trailer();
        assert_eq!(udp.serialize().unwrap().len(), 10);

        // without a length hook every remaining bit is payload
        udp.decode(&bytes, 0, bytes.len() * 8).unwrap();
        assert!(udp.trailer().is_none());
        assert_eq!(udp.raw_payload().map(|raw| raw.len()), Some(5));
    }
}
