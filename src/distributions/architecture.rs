use anyhow::{Result, anyhow};
use std::fmt::{self, Display};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize)]
#[serde(try_from = "String")]
pub enum Architecture {
    Alpha,
    Arm,
    Arm64,
    Ia64,
    Loongarch64,
    MipsLe,
    Mips64Le,
    Parisc,
    Ppc,
    Ppc64,
    Ppc64Le,
    Riscv32,
    Riscv64,
    S390,
    S390x,
    Tilegx,
    X86,
    X86_64,
}

const NAMES: [(Architecture, &str); 18] = [
    (Architecture::Alpha, "alpha"),
    (Architecture::Arm, "arm"),
    (Architecture::Arm64, "arm64"),
    (Architecture::Ia64, "ia64"),
    (Architecture::Loongarch64, "loongarch64"),
    (Architecture::MipsLe, "mips-le"),
    (Architecture::Mips64Le, "mips64-le"),
    (Architecture::Parisc, "parisc"),
    (Architecture::Ppc, "ppc"),
    (Architecture::Ppc64, "ppc64"),
    (Architecture::Ppc64Le, "ppc64-le"),
    (Architecture::Riscv32, "riscv32"),
    (Architecture::Riscv64, "riscv64"),
    (Architecture::S390, "s390"),
    (Architecture::S390x, "s390x"),
    (Architecture::Tilegx, "tilegx"),
    (Architecture::X86, "x86"),
    (Architecture::X86_64, "x86-64"),
];

impl Architecture {
    /// The architecture we were built for.
    pub fn native() -> Result<Architecture> {
        let little_endian = cfg!(target_endian = "little");
        let arch = match std::env::consts::ARCH {
            "x86_64" => Architecture::X86_64,
            "x86" => Architecture::X86,
            "aarch64" => Architecture::Arm64,
            "arm" => Architecture::Arm,
            "loongarch64" => Architecture::Loongarch64,
            "mips" if little_endian => Architecture::MipsLe,
            "mips64" if little_endian => Architecture::Mips64Le,
            "powerpc" => Architecture::Ppc,
            "powerpc64" if little_endian => Architecture::Ppc64Le,
            "powerpc64" => Architecture::Ppc64,
            "riscv32" => Architecture::Riscv32,
            "riscv64" => Architecture::Riscv64,
            "s390x" => Architecture::S390x,
            other => return Err(anyhow!("Unsupported native architecture: {}", other)),
        };
        Ok(arch)
    }
}

impl FromStr for Architecture {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.to_lowercase().replace('_', "-");
        NAMES
            .iter()
            .find(|(_, name)| *name == s)
            .map(|(arch, _)| *arch)
            .ok_or_else(|| format!("Invalid architecture: {}", s))
    }
}

impl TryFrom<String> for Architecture {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Architecture::from_str(&s)
    }
}

impl Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = NAMES
            .iter()
            .find(|(arch, _)| arch == self)
            .map_or("unknown", |(_, name)| name);
        write!(f, "{}", name)
    }
}
