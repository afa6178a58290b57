//! Access to the bytes of the program being decompiled.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endianness {
    #[default]
    Little,
    Big,
}

/// A source of instruction words, addressed by virtual address.
pub trait InstructionSource {
    /// Fills `buf` with the bytes starting at `vaddr`. Returns `false` if any byte is unmapped.
    fn read_bytes(&mut self, vaddr: u64, buf: &mut [u8]) -> bool;

    fn endianness(&self) -> Endianness;

    fn read_word(&mut self, vaddr: u64) -> Option<u32> {
        let mut buf = [0_u8; 4];
        if !self.read_bytes(vaddr, &mut buf) {
            return None;
        }
        let word: u32 = bytemuck::pod_read_unaligned(&buf);
        Some(match self.endianness() {
            Endianness::Little => u32::from_le(word),
            Endianness::Big => u32::from_be(word),
        })
    }
}

/// A contiguous image loaded at `base`.
#[derive(Debug, Clone)]
pub struct Image {
    pub base: u64,
    pub bytes: Vec<u8>,
    pub endianness: Endianness,
}

impl Image {
    pub fn new(base: u64, bytes: Vec<u8>, endianness: Endianness) -> Self {
        Self { base, bytes, endianness }
    }

    /// The address one past the last byte of the image.
    pub fn end(&self) -> u64 {
        self.base + self.bytes.len() as u64
    }

    /// Copies the bytes at `vaddr` to `buf`, returning `false` if they are not all in the image.
    pub fn read(&self, vaddr: u64, buf: &mut [u8]) -> bool {
        let Some(start) = vaddr.checked_sub(self.base)
        else {
            return false;
        };
        let start = start as usize;
        let Some(end) = start.checked_add(buf.len())
        else {
            return false;
        };
        match self.bytes.get(start..end) {
            Some(bytes) => {
                buf.copy_from_slice(bytes);
                true
            }
            None => false,
        }
    }
}

impl InstructionSource for Image {
    fn read_bytes(&mut self, vaddr: u64, buf: &mut [u8]) -> bool {
        self.read(vaddr, buf)
    }

    fn endianness(&self) -> Endianness {
        self.endianness
    }
}

impl<T: InstructionSource + ?Sized> InstructionSource for &mut T {
    fn read_bytes(&mut self, vaddr: u64, buf: &mut [u8]) -> bool {
        (**self).read_bytes(vaddr, buf)
    }

    fn endianness(&self) -> Endianness {
        (**self).endianness()
    }
}
