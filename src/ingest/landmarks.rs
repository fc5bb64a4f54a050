/// Vague area names that geocode poorly, mapped to a landmark inside them.
const LANDMARKS: [(&str, &str); 10] = [
    ("Marina Bay", "Marina Bay Sands"),
    ("Orchard Road", "ION Orchard"),
    ("Orchard", "ION Orchard"),
    ("Sentosa", "Resorts World Sentosa"),
    ("Chinatown", "Chinatown Point"),
    ("Clarke Quay", "Clarke Quay Central"),
    ("Bugis", "Bugis Junction"),
    ("Kampong Glam", "Sultan Mosque"),
    ("Little India", "Tekka Centre"),
    ("Jurong East", "JEM"),
];

pub fn landmark_for(area: &str) -> Option<&'static str> {
    let area = area.trim();
    LANDMARKS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(area))
        .map(|(_, landmark)| *landmark)
}

/// Replace a vague leading area name, keeping any trailing qualifiers.
///
/// Only the first comma-separated segment is compared, and only as an exact
/// (case-insensitive) match: `"Marina Bay Sands, Singapore"` passes through.
pub fn normalize_location(location: &str) -> String {
    let trimmed = location.trim();
    let (head, tail) = match trimmed.split_once(',') {
        Some((head, tail)) => (head, Some(tail)),
        None => (trimmed, None),
    };

    match (landmark_for(head), tail) {
        (Some(landmark), Some(tail)) => format!("{landmark},{tail}"),
        (Some(landmark), None) => landmark.to_string(),
        (None, _) => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_known_areas() {
        assert_eq!(
            normalize_location("Marina Bay, Singapore"),
            "Marina Bay Sands, Singapore"
        );
        assert_eq!(normalize_location("orchard road"), "ION Orchard");
    }

    #[test]
    fn leaves_specific_locations_alone() {
        assert_eq!(
            normalize_location("Marina Bay Sands, Singapore"),
            "Marina Bay Sands, Singapore"
        );
        assert_eq!(
            normalize_location("1 Esplanade Dr, Singapore 038981"),
            "1 Esplanade Dr, Singapore 038981"
        );
        assert_eq!(normalize_location("The Marina Bay area"), "The Marina Bay area");
    }
}
