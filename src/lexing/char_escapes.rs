//! Character escapes allow string and char literals to encode characters
//! that are otherwise awkward to write directly in UTF-8 source, such as
//! newlines and hard tabs.

use std::collections::HashMap;

/// Map escape characters to the literal characters they represent. This is
/// a one-to-one mapping for now, though that isn't guaranteed to remain
/// the case as more escapes are added.
pub fn new() -> HashMap<char, char> {
    let mut map = HashMap::new();
    map.extend(vec![
        ('n', '\n'),
        ('r', '\r'),
        ('t', '\t'),
        ('\\', '\\'),
        ('\'', '\''),
    ]);
    map
}
