//! Archive path normalization.
//!
//! Archive tables store paths with whatever separators and case the
//! original tool used. Paths are normalized once when a table is read
//! ([`normalize`]) and looked up through a case-folded key ([`lookup_key`]).

/// Separator between an outer archive entry and a path inside it,
/// as in `outer.pak:inner/path`.
pub const NESTED_SEPARATOR: char = ':';

/// Normalize a table path: forward slashes, no leading `./` or `/`,
/// no repeated separators.
///
/// Case is preserved.
///
/// ```
/// use hoard_common::path::normalize;
///
/// assert_eq!(normalize(r"Meshes\x\\ex_common.nif"), "Meshes/x/ex_common.nif");
/// assert_eq!(normalize("./data/file.txt"), "data/file.txt");
/// ```
pub fn normalize(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for segment in path.split(['/', '\\']) {
        if segment.is_empty() || segment == "." {
            continue;
        }
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(segment);
    }
    out
}

/// Case-folded lookup key for a path.
pub fn lookup_key(path: &str) -> String {
    normalize(path).to_lowercase()
}

/// Lowercase extension of the last path segment, without the dot.
pub fn extension(path: &str) -> Option<String> {
    let name = file_name(path);
    let dot = name.rfind('.')?;
    if dot == 0 || dot + 1 == name.len() {
        return None;
    }
    Some(name[dot + 1..].to_ascii_lowercase())
}

/// Last segment of a path.
pub fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Check whether a path contains glob wildcards.
pub fn has_wildcards(path: &str) -> bool {
    path.contains(['*', '?', '['])
}

/// Iterate the ways a nested path can be split into an outer entry and
/// an inner remainder, shortest outer part first.
///
/// ```
/// use hoard_common::path::nested_splits;
///
/// let splits: Vec<_> = nested_splits("a.pak:b.pak:c.txt").collect();
/// assert_eq!(splits, vec![("a.pak", "b.pak:c.txt"), ("a.pak:b.pak", "c.txt")]);
/// ```
pub fn nested_splits(path: &str) -> impl Iterator<Item = (&str, &str)> {
    path.match_indices(NESTED_SEPARATOR)
        .map(move |(idx, _)| (&path[..idx], &path[idx + 1..]))
}
