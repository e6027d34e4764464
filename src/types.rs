//! Common types shared by the client data access layer

use std::fmt;

/// Client generation, in release order.
///
/// The archive family is derived from this: everything up to and including
/// Mists of Pandaria ships MPQ archives, everything newer ships CASC storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ClientVersion {
    Vanilla,
    Tbc,
    Wotlk,
    Cata,
    Mop,
    Wod,
    Legion,
    Bfa,
    Shadowlands,
    Dragonflight,
}

impl ClientVersion {
    /// The storage family this client generation ships its assets in.
    pub fn storage_type(self) -> StorageType {
        if self > ClientVersion::Mop {
            StorageType::Casc
        } else {
            StorageType::Mpq
        }
    }

    /// Whether this MPQ-era generation delivers updates as patch overlays
    /// attached to a base archive instead of independent archives.
    pub fn uses_patch_overlays(self) -> bool {
        self >= ClientVersion::Cata
    }
}

/// Physical archive family of a client installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageType {
    Mpq,
    Casc,
}

/// Whether the storage is read from disk or backed by a CDN cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpenMode {
    Local,
    Remote,
}

/// Client locale. `Auto` requests detection from the installation and is
/// only valid for MPQ-era clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Locale {
    Auto,
    EnGb,
    EnUs,
    DeDe,
    KoKr,
    FrFr,
    ZhCn,
    ZhTw,
    EsEs,
    EsMx,
    RuRu,
}

/// Locale codes in stable ordinal order (`Locale::EnGb` first).
pub const LOCALE_CODES: [&str; 10] = [
    "enGB", "enUS", "deDE", "koKR", "frFR", "zhCN", "zhTW", "esES", "esMX", "ruRU",
];

impl Locale {
    /// The four-letter client locale code, or `None` for `Auto`.
    pub fn code(self) -> Option<&'static str> {
        match self {
            Locale::Auto => None,
            _ => Some(LOCALE_CODES[self.ordinal() as usize - 1]),
        }
    }

    /// Parse a four-letter locale code (case-sensitive, as the client
    /// writes them).
    pub fn from_code(code: &str) -> Option<Locale> {
        let idx = LOCALE_CODES.iter().position(|&c| c == code)?;
        Some(Locale::from_ordinal(idx as u8 + 1))
    }

    fn ordinal(self) -> u8 {
        match self {
            Locale::Auto => 0,
            Locale::EnGb => 1,
            Locale::EnUs => 2,
            Locale::DeDe => 3,
            Locale::KoKr => 4,
            Locale::FrFr => 5,
            Locale::ZhCn => 6,
            Locale::ZhTw => 7,
            Locale::EsEs => 8,
            Locale::EsMx => 9,
            Locale::RuRu => 10,
        }
    }

    fn from_ordinal(ordinal: u8) -> Locale {
        match ordinal {
            1 => Locale::EnGb,
            2 => Locale::EnUs,
            3 => Locale::DeDe,
            4 => Locale::KoKr,
            5 => Locale::FrFr,
            6 => Locale::ZhCn,
            7 => Locale::ZhTw,
            8 => Locale::EsEs,
            9 => Locale::EsMx,
            10 => Locale::RuRu,
            _ => Locale::Auto,
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code().unwrap_or("auto"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_type_boundary() {
        assert_eq!(ClientVersion::Mop.storage_type(), StorageType::Mpq);
        assert_eq!(ClientVersion::Wod.storage_type(), StorageType::Casc);
        assert_eq!(ClientVersion::Vanilla.storage_type(), StorageType::Mpq);
        assert_eq!(ClientVersion::Dragonflight.storage_type(), StorageType::Casc);
    }

    #[test]
    fn patch_overlay_boundary() {
        assert!(!ClientVersion::Wotlk.uses_patch_overlays());
        assert!(ClientVersion::Cata.uses_patch_overlays());
        assert!(ClientVersion::Mop.uses_patch_overlays());
    }

    #[test]
    fn locale_codes_round_trip() {
        for (i, code) in LOCALE_CODES.iter().enumerate() {
            let locale = Locale::from_code(code).unwrap();
            assert_eq!(locale.code(), Some(*code));
            assert_eq!(locale.ordinal() as usize, i + 1);
        }
        assert_eq!(Locale::from_code("xxYY"), None);
        assert_eq!(Locale::Auto.code(), None);
    }
}
