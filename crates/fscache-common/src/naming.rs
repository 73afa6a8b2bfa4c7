//! Layer name normalization and output file naming

/// Normalize a layer name for use in file names and filters.
///
/// Lowercases the name and replaces spaces and hyphens with underscores.
/// Every character is mapped one-to-one, so runs of separators are kept.
pub fn normalize_layer_name(name: &str) -> String {
    name.chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            ' ' | '-' => '_',
            other => other,
        })
        .collect()
}

/// Build the output file name `<prefix><layer_name>.<extension>`.
pub fn layer_file_name(prefix: &str, layer_name: &str, extension: &str) -> String {
    format!("{}{}.{}", prefix, layer_name, extension.trim_start_matches('.'))
}
