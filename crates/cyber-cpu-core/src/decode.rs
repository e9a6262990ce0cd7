/// Instruction formats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Format {
    /// One parcel: opcode, j, k.
    #[default]
    Jk,
    /// Two parcels: opcode, j, k, then i and a 12-bit D. Opcodes 0xC0..=0xC7 and 0xD0..=0xDF
    /// also encode S in the low three opcode bits.
    JkiD,
    /// Two parcels: opcode, j, k, then a 16-bit Q.
    JkQ,
}

impl Format {
    /// Instruction length in bytes.
    #[inline]
    pub const fn len(self) -> u32 {
        match self {
            Format::Jk => 2,
            Format::JkiD | Format::JkQ => 4,
        }
    }

    #[inline]
    pub const fn has_second_parcel(self) -> bool {
        !matches!(self, Format::Jk)
    }
}

/// A decoded instruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Instruction {
    pub opcode: u8,
    pub format: Format,
    pub j: u8,
    pub k: u8,
    pub i: u8,
    pub d: u16,
    pub q: u16,
}

impl Instruction {
    pub fn decode(format: Format, first: u16, second: u16) -> Self {
        let mut inst = Self {
            opcode: (first >> 8) as u8,
            format,
            j: ((first >> 4) & 0xF) as u8,
            k: (first & 0xF) as u8,
            ..Self::default()
        };
        match format {
            Format::Jk => {}
            Format::JkiD => {
                inst.i = (second >> 12) as u8;
                inst.d = second & 0xFFF;
            }
            Format::JkQ => inst.q = second,
        }
        inst
    }

    #[inline]
    pub fn len(&self) -> u32 {
        self.format.len()
    }

    /// Q as a signed displacement.
    #[inline]
    pub fn q_signed(&self) -> i64 {
        i64::from(self.q as i16)
    }

    /// D as a signed 12-bit displacement.
    #[inline]
    pub fn d_signed(&self) -> i64 {
        i64::from(((self.d << 4) as i16) >> 4)
    }

    /// Byte count (1..=8) encoded in the low opcode bits of the SjkiD group.
    #[inline]
    pub fn s_length(&self) -> usize {
        usize::from(self.opcode & 7) + 1
    }
}
