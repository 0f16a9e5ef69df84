//! Declarative header schemas
//!
//! A protocol describes its header once, as an ordered list of fields with
//! their bit widths. The builder assigns bit offsets sequentially, so the
//! declaration order is the wire order:
//!
//! ```text
//! SchemaBuilder::new("802.1Q")
//!     .number(Priority, 3)      // bits  0..3
//!     .number(Cfi, 1)           // bits  3..4
//!     .number(VlanId, 12)       // bits  4..16
//!     .number(EtherType, 16)    // bits 16..32
//! ```
//!
//! Schemas are built lazily once per protocol and shared read-only by every
//! packet of that protocol.

use std::fmt;
use std::hash::Hash;

use pktwire_core::bits::bytes_for_bits;

/// Identifier of a header field
///
/// Implemented by the per-protocol field enums declared with
/// `header_fields!`. The index is the variant's ordinal and is used to
/// address the field's slot in a [`FieldMap`](crate::fields::FieldMap).
pub trait FieldId: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    /// Number of fields of the protocol
    const COUNT: usize;

    /// Ordinal of the field, `0..COUNT`
    fn index(self) -> usize;

    /// Field name used in logs, errors and `Display` output
    fn name(self) -> &'static str;
}

/// Declares a protocol's field enum and implements [`FieldId`] for it
macro_rules! header_fields {
    (@one $variant:ident) => {
        1
    };
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $label:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $( $(#[$vmeta])* $variant, )+
        }

        impl $crate::schema::FieldId for $name {
            const COUNT: usize = 0 $( + $crate::schema::header_fields!(@one $variant) )+;

            fn index(self) -> usize {
                self as usize
            }

            fn name(self) -> &'static str {
                match self {
                    $( $name::$variant => $label, )+
                }
            }
        }
    };
}

pub(crate) use header_fields;

/// How a field's value is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Integer field; storage rounded up to a power-of-two byte count
    Number,
    /// Opaque bytes (addresses, options); storage is exactly `ceil(bits / 8)`
    Bytes,
}

/// Position and size of one header field
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec<F> {
    id: F,
    bit_offset: usize,
    bit_width: usize,
    kind: FieldKind,
    variable: bool,
}

impl<F: FieldId> FieldSpec<F> {
    /// Field identifier
    pub fn id(&self) -> F {
        self.id
    }

    /// Field name
    pub fn name(&self) -> &'static str {
        self.id.name()
    }

    /// Bit offset from the start of the header
    pub fn bit_offset(&self) -> usize {
        self.bit_offset
    }

    /// Declared bit width (zero for variable-length fields)
    pub fn bit_width(&self) -> usize {
        self.bit_width
    }

    /// Storage kind
    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    /// True for the trailing variable-length field of a protocol
    pub fn is_variable(&self) -> bool {
        self.variable
    }

    /// Byte capacity of the value buffer for a field `bit_width` bits wide
    ///
    /// A 3-bit number gets 1 byte, a 13-bit number 2 bytes, a 24-bit number
    /// 4 bytes. Byte fields are never rounded.
    pub fn storage_size(&self, bit_width: usize) -> usize {
        let bytes = bytes_for_bits(bit_width);
        match self.kind {
            FieldKind::Number if bytes > 0 => bytes.next_power_of_two(),
            _ => bytes,
        }
    }

    /// Storage size at the declared width
    pub fn declared_storage_size(&self) -> usize {
        self.storage_size(self.bit_width)
    }
}

/// Ordered, immutable description of a protocol header
#[derive(Debug)]
pub struct HeaderSchema<F> {
    protocol: &'static str,
    fields: Vec<FieldSpec<F>>,
    slots: Vec<Option<usize>>,
    fixed_bits: usize,
}

impl<F: FieldId> HeaderSchema<F> {
    /// Protocol name the schema belongs to
    pub fn protocol(&self) -> &'static str {
        self.protocol
    }

    /// Fields in wire order
    pub fn fields(&self) -> &[FieldSpec<F>] {
        &self.fields
    }

    /// Looks up the spec of a field
    pub fn spec(&self, id: F) -> Option<&FieldSpec<F>> {
        let slot = (*self.slots.get(id.index())?)?;
        self.fields.get(slot)
    }

    /// Total width of all fixed-width fields
    pub fn fixed_bits(&self) -> usize {
        self.fixed_bits
    }

    /// Number of declared fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True if no field is declared
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Builds a [`HeaderSchema`] from field declarations in wire order
pub struct SchemaBuilder<F> {
    protocol: &'static str,
    fields: Vec<FieldSpec<F>>,
    offset: usize,
}

impl<F: FieldId> SchemaBuilder<F> {
    /// Start a schema for `protocol`
    pub fn new(protocol: &'static str) -> Self {
        SchemaBuilder {
            protocol,
            fields: Vec::with_capacity(F::COUNT),
            offset: 0,
        }
    }

    /// Declare an integer field of `bit_width` bits
    pub fn number(self, id: F, bit_width: usize) -> Self {
        self.push(id, bit_width, FieldKind::Number, false)
    }

    /// Declare a byte-array field of `bit_width` bits
    pub fn bytes(self, id: F, bit_width: usize) -> Self {
        self.push(id, bit_width, FieldKind::Bytes, false)
    }

    /// Declare the trailing variable-length byte field. Its width is
    /// computed per packet by the protocol.
    pub fn variable(self, id: F) -> Self {
        self.push(id, 0, FieldKind::Bytes, true)
    }

    fn push(mut self, id: F, bit_width: usize, kind: FieldKind, variable: bool) -> Self {
        debug_assert!(
            self.fields.last().map_or(true, |last| !last.variable),
            "{}: variable field must be declared last",
            self.protocol
        );
        self.fields.push(FieldSpec {
            id,
            bit_offset: self.offset,
            bit_width,
            kind,
            variable,
        });
        self.offset += bit_width;
        self
    }

    /// Finish the schema
    pub fn build(self) -> HeaderSchema<F> {
        let mut slots = vec![None; F::COUNT];
        for (position, spec) in self.fields.iter().enumerate() {
            slots[spec.id.index()] = Some(position);
        }

        HeaderSchema {
            protocol: self.protocol,
            fields: self.fields,
            slots,
            fixed_bits: self.offset,
        }
    }
}
