//! 🔍 The Record Decoder: one tab-separated line in, one [`AppsInstalled`] (or a shrug) out.
//!
//! 🧠 Knowledge graph:
//! - Input shape: `dev_type \t dev_id \t lat \t lon \t app,app,app`
//! - `None` means "skip this line, count it as an error". It is never a panic and never an `Err`.
//! - App ids: strict pass first. If any token is not a number, a lenient pass keeps only the
//!   numeric ones and we log a warning. The record still ships.
//! - Coordinates: best-effort. A coordinate that will not parse becomes `NaN`, gets a warning,
//!   and the record still ships. Downstream decides whether `NaN` is a place on Earth.
//!
//! "He who panics on a malformed line, never finishes the file." 🦆

use tracing::warn;

use crate::common::AppsInstalled;

/// 🔪 The one true field separator.
pub(crate) const FIELD_DELIMITER: char = '\t';
/// 🔪 And the one true app-id separator, living inside the last field.
pub(crate) const APPS_DELIMITER: char = ',';

/// 🎯 Decode one line. `None` = skip.
pub(crate) fn parse_appsinstalled(line: &str) -> Option<AppsInstalled> {
    // -- ✂️ trim whitespace but keep tabs: a trailing tab is an empty app list, not noise
    let line = line.trim_matches(|c: char| c.is_whitespace() && c != FIELD_DELIMITER);
    let line_parts: Vec<&str> = line.split(FIELD_DELIMITER).collect();
    // -- 💀 too few fields is a broken line. too many is also a broken line, just louder.
    let [dev_type, dev_id, lat, lon, raw_apps] = line_parts.as_slice() else {
        return None;
    };
    if dev_type.is_empty() || dev_id.is_empty() {
        return None;
    }

    let apps = parse_apps(raw_apps).unwrap_or_else(|| {
        warn!("⚠️ Not all user apps are digits: `{}`", line);
        parse_apps_leniently(raw_apps)
    });

    let lat = lat.trim().parse::<f64>();
    let lon = lon.trim().parse::<f64>();
    if lat.is_err() || lon.is_err() {
        warn!("⚠️ Invalid geo coords: `{}`", line);
    }

    Some(AppsInstalled {
        dev_type: dev_type.to_string(),
        dev_id: dev_id.to_string(),
        lat: lat.unwrap_or(f64::NAN),
        lon: lon.unwrap_or(f64::NAN),
        apps,
    })
}

/// ✅ Strict: every token must be a `u32`, or the whole list is rejected.
fn parse_apps(raw_apps: &str) -> Option<Vec<u32>> {
    // -- 🫙 an empty field is an empty list, not a list of one bad token
    if raw_apps.trim().is_empty() {
        return Some(Vec::new());
    }
    raw_apps
        .split(APPS_DELIMITER)
        .map(|token| token.trim().parse::<u32>().ok())
        .collect()
}

/// 🧹 Lenient: keep the numbers, drop the rest, preserve order.
fn parse_apps_leniently(raw_apps: &str) -> Vec<u32> {
    raw_apps
        .split(APPS_DELIMITER)
        .filter_map(|token| token.trim().parse::<u32>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_a_good_line_decodes_cleanly() {
        let record = parse_appsinstalled("idfa\tID1\t55.55\t42.42\t1,2,3")
            .expect("💀 a perfectly fine line was rejected");
        assert_eq!(record.dev_type, "idfa");
        assert_eq!(record.dev_id, "ID1");
        assert_eq!(record.lat, 55.55);
        assert_eq!(record.lon, 42.42);
        assert_eq!(record.apps, vec![1, 2, 3]);
    }

    #[test]
    fn the_one_where_decoding_twice_gives_the_same_answer() {
        let line = "gaid\t7rfw452y52g2gq4g\t55.55\t42.42\t7423,424";
        assert_eq!(parse_appsinstalled(line), parse_appsinstalled(line));
    }

    #[test]
    fn the_one_where_four_fields_are_not_enough() {
        assert_eq!(parse_appsinstalled("idfa\tID1\t55.55\t42.42"), None);
        assert_eq!(parse_appsinstalled("just one field"), None);
        assert_eq!(parse_appsinstalled(""), None);
    }

    #[test]
    fn the_one_where_six_fields_are_too_many() {
        assert_eq!(parse_appsinstalled("idfa\tID1\t1.0\t2.0\t3\textra"), None);
    }

    #[test]
    fn the_one_where_empty_type_or_id_gets_skipped() {
        assert_eq!(parse_appsinstalled("\tID1\t1.0\t2.0\t3"), None);
        assert_eq!(parse_appsinstalled("idfa\t\t1.0\t2.0\t3"), None);
    }

    #[test]
    fn the_one_where_non_numeric_apps_are_quietly_dropped_in_order() {
        let record = parse_appsinstalled("idfa\tID1\t1.0\t2.0\t5,abc,7, 9 ,x1,11")
            .expect("💀 lenient app parsing should still produce a record");
        assert_eq!(record.apps, vec![5, 7, 9, 11]);
    }

    #[test]
    fn the_one_where_an_empty_app_list_is_still_a_record() {
        let record = parse_appsinstalled("adid\tID3\t1.0\t2.0\t")
            .expect("💀 empty app list should not sink the record");
        assert!(record.apps.is_empty());
    }

    #[test]
    fn the_one_where_an_empty_field_passes_the_strict_check() {
        // 🧪 strict pass accepting it means the "not all digits" warning never fires
        assert_eq!(parse_apps(""), Some(vec![]));
        assert_eq!(parse_apps("  "), Some(vec![]));
        assert_eq!(parse_apps("1,,2"), None);
        assert_eq!(parse_apps("4,5"), Some(vec![4, 5]));
    }

    #[test]
    fn the_one_where_bad_coords_still_ship_as_nan() {
        let record = parse_appsinstalled("dvid\tID4\tnorth-ish\t42.42\t1")
            .expect("💀 bad coordinates are a warning, not a skip");
        assert!(record.lat.is_nan());
        assert_eq!(record.lon, 42.42);
        assert_eq!(record.apps, vec![1]);
    }

    #[test]
    fn the_one_where_surrounding_whitespace_is_trimmed() {
        let record = parse_appsinstalled("  idfa\tID1\t1.5\t2.5\t8\r\n")
            .expect("💀 a trailing CRLF should not break decoding");
        assert_eq!(record.dev_type, "idfa");
        assert_eq!(record.apps, vec![8]);
    }
}
