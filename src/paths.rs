//! Filename normalization helpers
//!
//! Client paths appear in three spellings depending on who is asked: the
//! archives store Windows-style backslash paths, project mirrors on disk use
//! forward slashes, and the access layer keys everything by a lowercase
//! forward-slash form. These helpers convert between them.

/// Unix form: backslashes become forward slashes, nothing else changes.
pub fn normalize_unix(filename: &str) -> String {
    filename.replace('\\', "/")
}

/// Internal form: lowercase, forward slashes, and the legacy model
/// extensions `.mdx` / `.mdl` unified to `.m2`.
///
/// This is the canonical key form used by [`FileKey`](crate::FileKey) and the
/// listfile maps. Idempotent.
pub fn normalize_internal(filename: &str) -> String {
    let mut name = filename.to_ascii_lowercase().replace('\\', "/");

    if name.ends_with(".mdx") || name.ends_with(".mdl") {
        name.truncate(name.len() - 4);
        name.push_str(".m2");
    }

    name
}

/// WoW form: uppercase with backslashes, as legacy archive APIs expect.
pub fn normalize_wow(filename: &str) -> String {
    filename.to_ascii_uppercase().replace('/', "\\")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn unix_form() {
        assert_eq!(normalize_unix("World\\Maps\\Azeroth\\Azeroth.wdt"), "World/Maps/Azeroth/Azeroth.wdt");
        assert_eq!(normalize_unix("already/unix.blp"), "already/unix.blp");
    }

    #[test]
    fn internal_form() {
        assert_eq!(
            normalize_internal("World\\Maps\\Azeroth\\Azeroth.wdt"),
            "world/maps/azeroth/azeroth.wdt"
        );
        assert_eq!(normalize_internal("Creature\\Rat\\Rat.MDX"), "creature/rat/rat.m2");
        assert_eq!(normalize_internal("Creature\\Rat\\Rat.mdl"), "creature/rat/rat.m2");
        assert_eq!(normalize_internal("creature/rat/rat.m2"), "creature/rat/rat.m2");
    }

    #[test]
    fn internal_form_is_idempotent() {
        let once = normalize_internal("Creature\\Rat\\Rat.MDX");
        assert_eq!(normalize_internal(&once), once);
    }

    #[test]
    fn wow_form() {
        assert_eq!(
            normalize_wow("interface/icons/spell_fire_fire.blp"),
            "INTERFACE\\ICONS\\SPELL_FIRE_FIRE.BLP"
        );
    }
}
