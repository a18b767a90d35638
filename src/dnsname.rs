//! Helpers for ordering and comparing domain names.
//!
//! `namehierarchy` (`spec.md` §3) orders records by name in descending
//! DNS-label order so ancestors and descendants of a name occupy a
//! contiguous range. `hickory_proto::rr::Name` already compares
//! label-by-label from the root, which is the wrong direction for that
//! property; [`hierarchy_key`] produces a key in the right order.

use hickory_proto::rr::Name;

/// Key suitable for ordering names so that all descendants of `n` are
/// adjacent to `n` in sorted order: the labels of `n`, root-to-leaf,
/// reversed so comparison starts at the topmost label shared by a
/// candidate ancestor/descendant pair.
pub fn hierarchy_key(name: &Name) -> Vec<Vec<u8>> {
    let mut labels: Vec<Vec<u8>> = name
        .iter()
        .map(|l| l.to_ascii_lowercase())
        .collect();
    labels.reverse();
    labels
}

/// True if `ancestor` is a (non-strict) ancestor of `name`, i.e. `name`
/// equals `ancestor` or is a subdomain of it.
pub fn is_ancestor_or_equal(ancestor: &Name, name: &Name) -> bool {
    if ancestor.num_labels() > name.num_labels() {
        return false;
    }
    ancestor.zone_of(name)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn hierarchy_key_orders_ancestors_adjacent_to_descendants() {
        let apex = Name::from_str("example.").unwrap();
        let www = Name::from_str("www.example.").unwrap();
        let xyz = Name::from_str("xyz.example.").unwrap();
        let mut keys = vec![
            (hierarchy_key(&xyz), "xyz"),
            (hierarchy_key(&apex), "apex"),
            (hierarchy_key(&www), "www"),
        ];
        keys.sort();
        let order: Vec<_> = keys.into_iter().map(|(_, n)| n).collect();
        assert_eq!(order, vec!["apex", "www", "xyz"]);
    }

    #[test]
    fn ancestor_check() {
        let apex = Name::from_str("example.").unwrap();
        let www = Name::from_str("www.example.").unwrap();
        assert!(is_ancestor_or_equal(&apex, &www));
        assert!(is_ancestor_or_equal(&apex, &apex));
        assert!(!is_ancestor_or_equal(&www, &apex));
    }
}
