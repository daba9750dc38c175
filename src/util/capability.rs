use caps::CapSet;
use log::warn;

/// The capabilities whose presence changes how we sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    NetAdmin,
    SysAdmin,
}

impl Capability {
    fn as_caps(self) -> caps::Capability {
        match self {
            Capability::NetAdmin => caps::Capability::CAP_NET_ADMIN,
            Capability::SysAdmin => caps::Capability::CAP_SYS_ADMIN,
        }
    }

    /// Mask of this capability in the kernel's capability bitsets.
    pub fn bit(self) -> u64 {
        1 << self.as_caps().index()
    }
}

/// Effective capability set of a process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    effective: u64,
}

impl Capabilities {
    pub fn from_bits(effective: u64) -> Self {
        Capabilities { effective }
    }

    pub fn current() -> Self {
        match caps::read(None, CapSet::Effective) {
            Ok(set) => Capabilities {
                effective: set.iter().fold(0, |bits, cap| bits | 1 << cap.index()),
            },
            Err(e) => {
                warn!("Failed to read effective capabilities, assuming none: {}", e);
                Self::default()
            }
        }
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.effective & capability.bit() != 0
    }
}

pub fn have_effective_cap(capability: Capability) -> bool {
    Capabilities::current().has(capability)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_match_kernel_numbers() {
        assert_eq!(Capability::NetAdmin.bit(), 1 << 12);
        assert_eq!(Capability::SysAdmin.bit(), 1 << 21);
    }

    #[test]
    fn test_from_bits() {
        let caps = Capabilities::from_bits(1 << 12);
        assert!(caps.has(Capability::NetAdmin));
        assert!(!caps.has(Capability::SysAdmin));
        assert!(!Capabilities::default().has(Capability::NetAdmin));
    }

    #[test]
    fn test_have_effective_cap_matches_caps_crate() {
        for capability in [Capability::NetAdmin, Capability::SysAdmin] {
            let expected =
                caps::has_cap(None, CapSet::Effective, capability.as_caps()).unwrap();
            assert_eq!(have_effective_cap(capability), expected);
        }
    }
}
