use super::tables::{CategoryIndex, MarkerPayload};
use super::{MarkerSchemaByName, Thread};

/// A marker with its name resolved, as handed to transforms.
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub name: String,
    pub start: f64,
    pub end: Option<f64>,
    pub category: CategoryIndex,
    pub data: Option<MarkerPayload>,
}

impl Marker {
    /// Case-insensitive match of `needle` (already lowercased) against the
    /// marker name and the payload fields its schema declares searchable.
    pub fn matches(&self, needle: &str, schemas: &MarkerSchemaByName) -> bool {
        if self.name.to_lowercase().contains(needle) {
            return true;
        }
        let Some(data) = &self.data else {
            return false;
        };
        let Some(schema) = schemas.get(&data.schema) else {
            return false;
        };
        schema
            .searchable
            .iter()
            .filter_map(|key| data.field(key))
            .any(|value| value.to_lowercase().contains(needle))
    }
}

/// Resolve the raw marker table of `thread` into [`Marker`]s.
pub fn derive_markers(thread: &Thread) -> Vec<Marker> {
    let raw = &thread.markers;
    (0..raw.len())
        .map(|i| Marker {
            name: thread.strings.get_or_empty(raw.name[i]).to_string(),
            start: raw.start[i],
            end: raw.end[i],
            category: raw.category[i],
            data: raw.data[i].clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{MarkerSchema, ThreadBuilder};

    #[test]
    fn search_covers_name_and_searchable_fields() {
        let thread = ThreadBuilder::new("Main")
            .marker("Paint", 0.0, Some(2.0))
            .marker_with_data(
                "Load",
                1.0,
                Some(3.0),
                "Network",
                &[("url", "https://Example.com/app.js"), ("secret", "token")],
            )
            .build();
        let markers = derive_markers(&thread);
        let mut schemas = MarkerSchemaByName::new();
        schemas.insert(
            "Network".into(),
            MarkerSchema {
                name: "Network".into(),
                searchable: vec!["url".into()],
            },
        );

        assert!(markers[0].matches("paint", &schemas));
        assert!(markers[1].matches("example.com", &schemas));
        assert!(!markers[1].matches("token", &schemas));
        assert!(!markers[0].matches("load", &schemas));
    }
}
