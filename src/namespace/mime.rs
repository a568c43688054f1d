//! Best-effort `mime_type` derivation from a path's extension (spec.md §3's
//! `FileRecord.mime_type`). Purely informational metadata surfaced through
//! `getattr`-adjacent calls — it plays no role in any invariant and is
//! never consulted by the engine.

pub fn guess(path: &str) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn known_extension_resolves() {
        assert_eq!(guess("/a/b/report.pdf"), "application/pdf");
    }

    #[test]
    fn unknown_extension_falls_back_to_octet_stream() {
        assert_eq!(guess("/a/b/file.unknownext"), "application/octet-stream");
    }
}
