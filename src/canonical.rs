//! Header canonicalization.
//!
//! Turns arbitrary header text into a stable key: ASCII lowercase letters and
//! digits separated by single underscores.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Slug used when a name canonicalizes to nothing.
pub const DEFAULT_SLUG: &str = "default";

/// Canonicalize a header into its key form.
///
/// Never fails. Input that contains no ASCII letters or digits after
/// stripping diacritics yields an empty string.
pub fn canonicalize(text: &str) -> String {
    let lowered = text.trim().to_lowercase();

    let mut key = String::with_capacity(lowered.len());
    let mut pending_sep = false;

    for c in lowered.nfkd().filter(|c| !is_combining_mark(*c)) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_sep && !key.is_empty() {
                key.push('_');
            }
            pending_sep = false;
            key.push(c);
        } else {
            pending_sep = true;
        }
    }

    key
}

/// Canonicalize a name that must never be blank (mapping slugs, file names).
pub fn slugify(name: &str) -> String {
    let key = canonicalize(name);
    if key.is_empty() {
        DEFAULT_SLUG.to_string()
    } else {
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_accents_and_symbols() {
        assert_eq!(canonicalize("Fecha Publicación"), "fecha_publicacion");
        assert_eq!(canonicalize("  Año (Nº)  "), "ano_no");
        assert_eq!(canonicalize("URL_Noticia"), "url_noticia");
        assert_eq!(canonicalize("Ñandú--Çà"), "nandu_ca");
    }

    #[test]
    fn test_collapses_and_trims_separators() {
        assert_eq!(canonicalize("__a   b__c__"), "a_b_c");
        assert_eq!(canonicalize("-x-"), "x");
        assert_eq!(canonicalize("medio/soporte"), "medio_soporte");
    }

    #[test]
    fn test_empty_and_symbol_only() {
        assert_eq!(canonicalize(""), "");
        assert_eq!(canonicalize("   "), "");
        assert_eq!(canonicalize("***"), "");
        assert_eq!(canonicalize("日本"), "");
    }

    #[test]
    fn test_idempotent() {
        let samples = [
            "Fecha Publicación",
            "  __Título__ de la NOTA ",
            "ÁÉÍÓÚ 123 äöü",
            "ｆｕｌｌ width",
            "",
            "***",
            "a_b_c",
        ];
        for s in samples {
            let once = canonicalize(s);
            assert_eq!(canonicalize(&once), once, "not idempotent for {s:?}");
        }
    }

    #[test]
    fn test_output_alphabet() {
        let key = canonicalize("Çà et là: 50% ¡Olé!");
        assert!(key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'));
        assert!(!key.starts_with('_') && !key.ends_with('_'));
        assert!(!key.contains("__"));
    }

    #[test]
    fn test_slugify_defaults() {
        assert_eq!(slugify("Simbiu"), "simbiu");
        assert_eq!(slugify("Prensa Local"), "prensa_local");
        assert_eq!(slugify(""), DEFAULT_SLUG);
        assert_eq!(slugify("¿?"), DEFAULT_SLUG);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn in_alphabet(key: &str) -> bool {
            key.chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
                && !key.starts_with('_')
                && !key.ends_with('_')
                && !key.contains("__")
        }

        proptest! {
            #[test]
            fn canonicalize_is_idempotent(s in any::<String>()) {
                let once = canonicalize(&s);
                prop_assert_eq!(canonicalize(&once), once);
            }

            #[test]
            fn canonicalize_stays_in_alphabet(s in any::<String>()) {
                let key = canonicalize(&s);
                prop_assert!(in_alphabet(&key), "{:?} -> {:?}", s, key);
            }

            #[test]
            fn headers_with_accents_keep_their_letters(s in "[A-Za-zÁÉÍÓÚáéíóúÑñÜü0-9 _./-]{0,24}") {
                let key = canonicalize(&s);
                prop_assert!(in_alphabet(&key));
                prop_assert_eq!(key.is_empty(), !s.chars().any(char::is_alphanumeric));
            }

            #[test]
            fn slugify_never_blank(s in any::<String>()) {
                let slug = slugify(&s);
                prop_assert!(!slug.is_empty());
                prop_assert!(in_alphabet(&slug));
            }
        }
    }
}
