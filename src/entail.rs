//! Entailment and validation of a posted graph against registry profiles.

use crate::archive::zip_entries;
use crate::error::ApiError;
use crate::profiles::ProfileRegistryCache;
use crate::rdf::{self, GraphSyntax};
use std::sync::Arc;

pub const ENTAILED_ENTRY: &str = "entailed.ttl";
pub const VALIDATION_TEXT_ENTRY: &str = "validation.txt";
pub const VALIDATION_GRAPH_ENTRY: &str = "validation.ttl";

pub struct EntailmentValidationService {
    profiles: Arc<ProfileRegistryCache>,
}

impl EntailmentValidationService {
    pub fn new(profiles: Arc<ProfileRegistryCache>) -> Self {
        Self { profiles }
    }

    /// Entail and validate `document` under the profiles it declares plus
    /// `profile_uris`, returning a zip archive with the entailed graph and
    /// the validation report.
    #[tracing::instrument(skip_all, fields(profiles = profile_uris.len()))]
    pub async fn validate(&self, document: &[u8], profile_uris: &[String]) -> Result<Vec<u8>, ApiError> {
        let graph = rdf::parse_any(GraphSyntax::sniff(document), document, None)
            .map_err(|e| ApiError::generic("ParserError", format!("{e:#}")))?;

        let registry = self
            .profiles
            .get()
            .await
            .map_err(|e| ApiError::unexpected("entail_validate", &e))?;

        if let Some(unknown) = profile_uris.iter().find(|uri| !registry.has_profile(uri)) {
            return Err(ApiError::unknown_profile(unknown));
        }

        let requested = profile_uris.to_vec();
        let archive = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<u8>> {
            let entailment = registry.entail(&graph, &requested)?;
            let report = registry.validate(&entailment.graph, &requested)?;
            tracing::debug!(
                chain = ?entailment.profiles,
                conforms = report.conforms(),
                results = report.results().len(),
                "entailment and validation complete"
            );

            let entailed = rdf::to_turtle(&entailment.graph)?;
            let text = report.text();
            let report_graph = rdf::to_turtle(&report.to_graph()?)?;
            zip_entries([
                (ENTAILED_ENTRY, entailed.as_bytes()),
                (VALIDATION_TEXT_ENTRY, text.as_bytes()),
                (VALIDATION_GRAPH_ENTRY, report_graph.as_bytes()),
            ])
        })
        .await
        .map_err(|e| ApiError::unexpected("entail_validate", &anyhow::Error::from(e)))?;

        archive.map_err(|e| ApiError::unexpected("entail_validate", &e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::profiles::RegistryOptions;
    use std::io::{Cursor, Read};
    use std::time::Duration;

    fn service_without_profiles() -> EntailmentValidationService {
        EntailmentValidationService::new(Arc::new(ProfileRegistryCache::new(
            Vec::new(),
            RegistryOptions::default(),
            Duration::from_secs(60),
        )))
    }

    #[tokio::test]
    async fn unparseable_graph_is_a_generic_error() {
        let err = service_without_profiles()
            .validate(b"this is not turtle", &[])
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Generic("ParserError".into()));
    }

    #[tokio::test]
    async fn unknown_profile_fails_fast() {
        let err = service_without_profiles()
            .validate(
                b"<http://x/a> <http://x/b> <http://x/c> .",
                &["https://example.org/nope".to_string()],
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnknownProfile);
        assert!(err.message.contains("https://example.org/nope"));
    }

    #[tokio::test]
    async fn empty_registry_produces_conforming_archive() {
        let bytes = service_without_profiles()
            .validate(b"<http://x/a> <http://x/b> <http://x/c> .", &[])
            .await
            .unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let names: Vec<_> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(names, vec![ENTAILED_ENTRY, VALIDATION_TEXT_ENTRY, VALIDATION_GRAPH_ENTRY]);

        let mut text = String::new();
        archive
            .by_name(VALIDATION_TEXT_ENTRY)
            .unwrap()
            .read_to_string(&mut text)
            .unwrap();
        assert!(text.contains("Conforms: True"));
    }
}
