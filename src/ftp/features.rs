//! Server feature/capability bits parsed from `FEAT` and `SYST` (spec §4.1).

use std::sync::atomic::{AtomicU8, Ordering};

/// Server OS class, inferred from the `SYST` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemClass {
    Unix,
    Windows,
    Unknown,
}

/// Capability bits advertised via `FEAT`, plus workaround flags this
/// backend has discovered it needs for the connected server.
#[derive(Debug, Clone, Default)]
pub struct ServerFeatures {
    pub mlsd: bool,
    pub mlst: bool,
    pub size: bool,
    pub mdtm: bool,
    pub mfmt: bool,
    pub rest_stream: bool,
    pub utf8: bool,
    pub epsv: bool,
    pub eprt: bool,
    pub pbsz: bool,
    pub prot: bool,
    pub tvfs: bool,
    pub clnt: bool,
    pub raw: Vec<String>,
    /// Workaround: re-probe FEAT once more after LOGIN, since some
    /// servers answer FEAT differently pre- vs post-authentication.
    pub feat_after_login: bool,
    pub system: SystemClass,
}

impl ServerFeatures {
    /// Parse a multi-line `FEAT` reply body (lines between the opening
    /// and closing status lines, leading-space-trimmed).
    pub fn parse_feat(lines: &[String]) -> Self {
        let mut f = ServerFeatures::default();
        for raw in lines {
            let line = raw.trim();
            if line.is_empty() || line.starts_with("211") {
                continue;
            }
            f.raw.push(line.to_string());
            let upper = line.to_ascii_uppercase();
            let tag = upper.split_whitespace().next().unwrap_or("");
            match tag {
                "MLSD" => f.mlsd = true,
                "MLST" => f.mlst = true,
                "SIZE" => f.size = true,
                "MDTM" => f.mdtm = true,
                "MFMT" => f.mfmt = true,
                "REST" if upper.contains("STREAM") => f.rest_stream = true,
                "UTF8" => f.utf8 = true,
                "EPSV" => f.epsv = true,
                "EPRT" => f.eprt = true,
                "PBSZ" => f.pbsz = true,
                "PROT" => f.prot = true,
                "TVFS" => f.tvfs = true,
                "CLNT" => f.clnt = true,
                _ => {}
            }
        }
        f
    }

    pub fn classify_system(banner: &str) -> SystemClass {
        let upper = banner.to_ascii_uppercase();
        if upper.contains("UNIX") || upper.contains("L8") {
            SystemClass::Unix
        } else if upper.contains("WINDOWS") || upper.contains("WIN32") {
            SystemClass::Windows
        } else {
            SystemClass::Unknown
        }
    }
}

/// The data-channel method most recently successful for a mount,
/// stored as a small atomic so [`crate::ftp::data_channel`] can do a
/// lock-free compare-and-set per spec §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DataMethod {
    Unknown = 0,
    Pasv = 1,
    PasvCommandAddress = 2,
    Epsv = 3,
    Port = 4,
    Eprt = 5,
}

impl DataMethod {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => DataMethod::Pasv,
            2 => DataMethod::PasvCommandAddress,
            3 => DataMethod::Epsv,
            4 => DataMethod::Port,
            5 => DataMethod::Eprt,
            _ => DataMethod::Unknown,
        }
    }
}

/// An atomic cell holding the preferred [`DataMethod`] for a mount.
#[derive(Debug, Default)]
pub struct PreferredMethod(AtomicU8);

impl PreferredMethod {
    pub fn new() -> Self {
        Self(AtomicU8::new(DataMethod::Unknown as u8))
    }

    pub fn get(&self) -> DataMethod {
        DataMethod::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, method: DataMethod) {
        self.0.store(method as u8, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_feat_lines() {
        let lines = vec![
            "211-Features:".to_string(),
            " MLSD".to_string(),
            " SIZE".to_string(),
            " EPSV".to_string(),
            " UTF8".to_string(),
            "211 End".to_string(),
        ];
        let f = ServerFeatures::parse_feat(&lines);
        assert!(f.mlsd);
        assert!(f.size);
        assert!(f.epsv);
        assert!(f.utf8);
        assert!(!f.eprt);
    }

    #[test]
    fn classifies_unix_banner() {
        assert_eq!(
            ServerFeatures::classify_system("215 UNIX Type: L8"),
            SystemClass::Unix
        );
    }

    #[test]
    fn preferred_method_roundtrip() {
        let m = PreferredMethod::new();
        assert_eq!(m.get(), DataMethod::Unknown);
        m.set(DataMethod::Epsv);
        assert_eq!(m.get(), DataMethod::Epsv);
    }
}
