use std::path::PathBuf;

use anyhow::Context;
use r5900_decompiler::{Config, Endianness};

pub struct DisConfig {
    /// The target the input was built for. Only its byte order is used.
    pub triple: target_lexicon::Triple,

    /// The address raw images are loaded at.
    pub base_addr: u64,

    /// A RON type library describing structures and functions.
    pub types_path: Option<PathBuf>,

    /// The number of worker threads functions are decompiled on.
    pub threads: usize,

    pub decompiler: Config,
}

impl DisConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let triple_string =
            std::env::var("R5900_TRIPLE").unwrap_or_else(|_| "mips64el-unknown-none".into());
        let triple =
            triple_string.parse().map_err(|e| anyhow::format_err!("{}: {}", triple_string, e))?;

        let base_addr = match std::env::var("R5900_BASE_ADDR") {
            Ok(addr) => parse_u64_with_prefix(&addr).context("error parsing `R5900_BASE_ADDR`")?,
            Err(_) => 0x0010_0000,
        };

        let threads = match std::env::var("R5900_THREADS") {
            Ok(count) => {
                let count = count.parse::<usize>().context("error parsing `R5900_THREADS`")?;
                anyhow::ensure!(count > 0, "`R5900_THREADS` must be at least 1");
                count
            }
            Err(_) => std::thread::available_parallelism().map_or(1, |n| n.get()),
        };

        let decompiler = Config {
            simplify_instructions: std::env::var_os("R5900_NO_SIMPLIFY").is_none(),
            reduce_expressions: std::env::var_os("R5900_NO_REDUCE").is_none(),
            ..Config::default()
        };

        Ok(Self {
            triple,
            base_addr,
            types_path: std::env::var_os("R5900_TYPES").map(|x| x.into()),
            threads,
            decompiler,
        })
    }

    pub fn endianness(&self) -> anyhow::Result<Endianness> {
        match self.triple.endianness() {
            Ok(target_lexicon::Endianness::Little) => Ok(Endianness::Little),
            Ok(target_lexicon::Endianness::Big) => Ok(Endianness::Big),
            Err(_) => anyhow::bail!("unknown byte order for {}", self.triple),
        }
    }
}

pub fn parse_u64_with_prefix(value: &str) -> Option<u64> {
    if let Some(hex) = value.strip_prefix("0x") {
        return u64::from_str_radix(hex, 16).ok();
    }
    if let Some(bin) = value.strip_prefix("0b") {
        return u64::from_str_radix(bin, 2).ok();
    }
    value.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::parse_u64_with_prefix;

    #[test]
    fn prefixed_numbers() {
        assert_eq!(parse_u64_with_prefix("0x100000"), Some(0x10_0000));
        assert_eq!(parse_u64_with_prefix("0b101"), Some(5));
        assert_eq!(parse_u64_with_prefix("42"), Some(42));
        assert_eq!(parse_u64_with_prefix("7"), Some(7));
        assert_eq!(parse_u64_with_prefix("0xzz"), None);
        assert_eq!(parse_u64_with_prefix("1é"), None);
        assert_eq!(parse_u64_with_prefix("é"), None);
    }
}
