//! Mode-polymorphic state serializer.
//!
//! The same `serialize` visitor is used to measure, save and load state. Every value is written
//! little-endian one byte at a time, so the produced bytes do not depend on host byte order or
//! struct layout. Booleans always take exactly one byte.

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
pub enum Mode {
    Measure,
    Save,
    Load,
}

pub struct Serializer {
    mode: Mode,
    buffer: Vec<u8>,
    cursor: usize,
    overrun: bool,
    invalid: Option<&'static str>,
}

impl Serializer {
    /// Creates a serializer that only counts bytes. The backing buffer is never touched.
    pub fn measure() -> Self {
        Self {
            mode: Mode::Measure,
            buffer: Vec::new(),
            cursor: 0,
            overrun: false,
            invalid: None,
        }
    }

    pub fn save(capacity: usize) -> Self {
        Self {
            mode: Mode::Save,
            buffer: Vec::with_capacity(capacity),
            cursor: 0,
            overrun: false,
            invalid: None,
        }
    }

    pub fn load(data: &[u8]) -> Self {
        Self {
            mode: Mode::Load,
            buffer: data.to_vec(),
            cursor: 0,
            overrun: false,
            invalid: None,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Number of bytes measured, written or consumed so far.
    pub fn size(&self) -> usize {
        self.cursor
    }

    /// True if a load tried to read past the end of the buffer. Values read past the end are 0.
    pub fn overrun(&self) -> bool {
        self.overrun
    }

    /// Marks the loaded data as unusable. Called by visitors that decode a value they cannot
    /// represent. The first reported field is kept.
    pub fn reject(&mut self, field: &'static str) {
        if self.mode == Mode::Load && self.invalid.is_none() {
            self.invalid = Some(field);
        }
    }

    /// Name of the first field that could not be decoded, if any.
    pub fn invalid(&self) -> Option<&'static str> {
        self.invalid
    }

    pub fn data(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_data(self) -> Vec<u8> {
        self.buffer
    }

    pub fn integer<T: Integer>(&mut self, value: &mut T) {
        match self.mode {
            Mode::Measure => self.cursor += T::BYTES,
            Mode::Save => {
                let bits = value.to_bits();
                for n in 0..T::BYTES {
                    self.buffer.push((bits >> (n * 8)) as u8);
                }
                self.cursor += T::BYTES;
            }
            Mode::Load => {
                let mut bits = 0_u64;
                for n in 0..T::BYTES {
                    bits |= (self.read_byte() as u64) << (n * 8);
                }
                *value = T::from_bits(bits);
            }
        }
    }

    pub fn boolean(&mut self, value: &mut bool) {
        let mut byte = *value as u8;
        self.integer(&mut byte);
        if self.mode == Mode::Load {
            *value = byte != 0;
        }
    }

    pub fn array<T: Serializable>(&mut self, values: &mut [T]) {
        for value in values {
            value.serialize(self);
        }
    }

    /// Raw bytes, identical in encoding to an array of `u8` but without per-element dispatch.
    pub fn bytes(&mut self, data: &mut [u8]) {
        match self.mode {
            Mode::Measure => self.cursor += data.len(),
            Mode::Save => {
                self.buffer.extend_from_slice(data);
                self.cursor += data.len();
            }
            Mode::Load => {
                let start = self.cursor.min(self.buffer.len());
                let available = (self.buffer.len() - start).min(data.len());
                data[..available].copy_from_slice(&self.buffer[start..start + available]);
                data[available..].fill(0);
                if available < data.len() {
                    self.overrun = true;
                }
                self.cursor += data.len();
            }
        }
    }

    /// Fixed-width text field. Shorter strings are padded with NUL, longer ones truncated.
    pub fn text<const N: usize>(&mut self, value: &mut [u8; N]) {
        self.bytes(value);
    }

    pub fn object<T: Serializable + ?Sized>(&mut self, object: &mut T) {
        object.serialize(self);
    }

    fn read_byte(&mut self) -> u8 {
        let byte = match self.buffer.get(self.cursor) {
            Some(byte) => *byte,
            None => {
                self.overrun = true;
                0
            }
        };
        self.cursor += 1;
        byte
    }
}

/// Implemented by anything that can persist its own state through a [Serializer].
///
/// Implementations must visit the same fields in the same order regardless of the mode.
pub trait Serializable {
    fn serialize(&mut self, s: &mut Serializer);
}

/// Fixed-size integers with a portable little-endian encoding.
pub trait Integer: Copy {
    const BYTES: usize;
    fn to_bits(self) -> u64;
    fn from_bits(bits: u64) -> Self;
}

macro_rules! impl_integer {
    ($($t:ty),*) => {
        $(
            impl Integer for $t {
                const BYTES: usize = std::mem::size_of::<$t>();

                #[inline]
                fn to_bits(self) -> u64 {
                    self as u64
                }

                #[inline]
                fn from_bits(bits: u64) -> Self {
                    bits as $t
                }
            }

            impl Serializable for $t {
                #[inline]
                fn serialize(&mut self, s: &mut Serializer) {
                    s.integer(self);
                }
            }
        )*
    };
}

impl_integer!(u8, u16, u32, u64, i8, i16, i32, i64);

impl Serializable for bool {
    fn serialize(&mut self, s: &mut Serializer) {
        s.boolean(self);
    }
}

impl<T: Serializable, const N: usize> Serializable for [T; N] {
    fn serialize(&mut self, s: &mut Serializer) {
        s.array(self);
    }
}

/// Copies `value` into a NUL padded fixed-width field.
pub fn fixed_text<const N: usize>(value: &str) -> [u8; N] {
    let mut field = [0_u8; N];
    let len = value.len().min(N);
    field[..len].copy_from_slice(&value.as_bytes()[..len]);
    field
}

/// Reads a NUL padded fixed-width field back into a string.
pub fn text_from_fixed(field: &[u8]) -> String {
    let end = field.iter().position(|b| *b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}
