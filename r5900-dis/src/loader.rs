use anyhow::Context;
use object::{Object, ObjectSegment, ObjectSymbol, SymbolKind};
use r5900_decompiler::{Endianness, Image, InstructionSource};

/// A function found in the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionRange {
    pub name: String,
    pub start: u64,
    pub end: u64,
}

/// The loaded segments of a program, together with the functions found in it.
pub struct Program {
    pub segments: Vec<Image>,
    pub functions: Vec<FunctionRange>,
}

impl Program {
    /// Loads an ELF file, or a raw image at `base_addr` if the data is not an ELF file.
    pub fn load(data: Vec<u8>, base_addr: u64, endianness: Endianness) -> anyhow::Result<Self> {
        match object::FileKind::parse(&data[..]) {
            Ok(object::FileKind::Elf32 | object::FileKind::Elf64) => Self::load_elf(&data),
            _ => {
                tracing::info!("loading raw image at {base_addr:#x} ({} bytes)", data.len());
                Ok(Self { segments: vec![Image::new(base_addr, data, endianness)], functions: vec![] })
            }
        }
    }

    fn load_elf(data: &[u8]) -> anyhow::Result<Self> {
        let file = object::read::File::parse(data).context("error parsing elf")?;
        let endianness = match file.is_little_endian() {
            true => Endianness::Little,
            false => Endianness::Big,
        };

        let mut segments = vec![];
        for segment in file.segments() {
            let bytes = segment.data().context("invalid segment data")?;
            if bytes.is_empty() {
                continue;
            }
            tracing::info!(
                "loaded {:#x}..{:#x}",
                segment.address(),
                segment.address() + bytes.len() as u64
            );
            segments.push(Image::new(segment.address(), bytes.to_vec(), endianness));
        }

        let mut functions: Vec<_> = file
            .symbols()
            .filter(|sym| sym.kind() == SymbolKind::Text && sym.size() != 0)
            .filter_map(|sym| {
                let name = sym.name().ok()?;
                Some(FunctionRange {
                    name: name.to_string(),
                    start: sym.address(),
                    end: sym.address() + sym.size(),
                })
            })
            .collect();
        functions.sort_by_key(|f| f.start);
        functions.dedup_by_key(|f| f.start);
        tracing::info!("found {} functions", functions.len());

        Ok(Self { segments, functions })
    }

    /// The range covered by the first segment, used when nothing else describes the code.
    pub fn default_range(&self) -> Option<FunctionRange> {
        let image = self.segments.first()?;
        let end = image.base + (image.bytes.len() as u64 & !3);
        (end > image.base).then(|| FunctionRange {
            name: format!("sub_{:x}", image.base),
            start: image.base,
            end,
        })
    }

    pub fn reader(&self) -> Reader {
        Reader { program: self }
    }
}

/// Reads instructions from any segment of a shared [Program].
pub struct Reader<'a> {
    program: &'a Program,
}

impl InstructionSource for Reader<'_> {
    fn read_bytes(&mut self, vaddr: u64, buf: &mut [u8]) -> bool {
        let Some(image) = self
            .program
            .segments
            .iter()
            .find(|image| (image.base..image.end()).contains(&vaddr))
        else {
            return false;
        };
        image.read(vaddr, buf)
    }

    fn endianness(&self) -> Endianness {
        self.program.segments.first().map_or(Endianness::Little, |image| image.endianness)
    }
}
