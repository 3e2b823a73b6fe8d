//! Profile registry
//!
//! Profiles are described with the W3C Profiles Vocabulary (PROF). Each
//! profile points at artifacts by role: validation artifacts hold SHACL
//! shapes, entailment artifacts hold SHACL SPARQL rules or plain CONSTRUCT
//! queries. A registry is built once from its sources and then only read.

pub mod cache;
pub mod rules;
pub mod shacl;

pub use cache::ProfileRegistryCache;
pub use rules::RuleSet;
pub use shacl::{Severity, ShapeValidator, ValidationReport, ValidationResult};

use crate::rdf::{self, DCT_NS, GraphSyntax, PROF_NS, SKOS_NS};
use anyhow::{Context, Result, bail};
use globset::Glob;
use indexmap::IndexMap;
use oxigraph::model::vocab::{rdf as rdf_vocab, rdfs};
use oxigraph::model::{NamedNode, NamedOrBlankNode, Term};
use oxigraph::store::Store;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const ROLE_VALIDATION: &str = "http://www.w3.org/ns/dx/prof/role/validation";
pub const ROLE_ENTAILMENT: &str = "http://www.w3.org/ns/dx/prof/role/entailment";

const SOURCE_EXTENSIONS: &[&str] = &["ttl", "nt", "rdf", "owl", "jsonld"];

fn prof(local: &str) -> NamedNode {
    NamedNode::new_unchecked(format!("{PROF_NS}{local}"))
}

/// A profile as listed by the registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Profile {
    #[serde(skip)]
    pub uri: String,
    pub label: Option<String>,
    pub token: Option<String>,
    #[serde(skip)]
    pub profile_of: Vec<String>,
    /// Artifact URIs keyed by role IRI
    pub artifacts: IndexMap<String, Vec<String>>,
}

impl Profile {
    fn artifacts_for(&self, role: &str) -> &[String] {
        self.artifacts.get(role).map(Vec::as_slice).unwrap_or_default()
    }
}

/// Options for building a registry.
#[derive(Debug, Clone, Default)]
pub struct RegistryOptions {
    /// Artifact URL prefix to local directory
    pub mappings: IndexMap<String, PathBuf>,
    pub ignore_artifact_errors: bool,
    pub client: reqwest::Client,
}

#[derive(Debug, Clone)]
struct LoadedArtifact {
    validator: Option<ShapeValidator>,
    rules: RuleSet,
}

/// Result of entailing a graph.
#[derive(Debug, Clone)]
pub struct Entailment {
    pub graph: Store,
    /// Profiles whose artifacts were applied, base profiles first
    pub profiles: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileRegistry {
    profiles: IndexMap<String, Profile>,
    artifacts: HashMap<String, LoadedArtifact>,
}

impl ProfileRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a registry from profile sources: file paths, directories, glob
    /// patterns or http(s) URLs.
    pub async fn load(sources: &[String], options: &RegistryOptions) -> Result<Self> {
        let descriptions = Store::new()?;
        for location in expand_sources(sources)? {
            let (bytes, name) = read_location(&location, &options.client).await?;
            let syntax = GraphSyntax::from_extension(&name).unwrap_or_else(|| GraphSyntax::sniff(&bytes));
            let base = location.base_iri();
            let graph = rdf::parse_any(syntax, &bytes, base.as_deref())
                .with_context(|| format!("failed to parse profile source {name}"))?;
            for quad in graph.iter() {
                descriptions.insert(&quad?)?;
            }
        }

        let profiles = read_profiles(&descriptions)?;
        let mut registry = Self {
            profiles,
            artifacts: HashMap::new(),
        };

        let wanted: Vec<String> = registry
            .profiles
            .values()
            .flat_map(|p| {
                p.artifacts_for(ROLE_VALIDATION)
                    .iter()
                    .chain(p.artifacts_for(ROLE_ENTAILMENT))
                    .cloned()
            })
            .collect();
        for uri in wanted {
            if registry.artifacts.contains_key(&uri) {
                continue;
            }
            match load_artifact(&uri, options).await {
                Ok(artifact) => {
                    registry.artifacts.insert(uri, artifact);
                }
                Err(e) if options.ignore_artifact_errors => {
                    tracing::warn!(artifact = %uri, error = %format!("{e:#}"), "skipping artifact that failed to load");
                }
                Err(e) => return Err(e.context(format!("failed to load artifact {uri}"))),
            }
        }

        Ok(registry)
    }

    pub fn get(&self, uri: &str) -> Option<&Profile> {
        self.profiles.get(uri)
    }

    pub fn has_profile(&self, uri: &str) -> bool {
        self.profiles.contains_key(uri)
    }

    pub fn profiles(&self) -> &IndexMap<String, Profile> {
        &self.profiles
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Profiles that apply to `data`: those it declares with `dct:conformsTo`
    /// plus `additional`, closed over `prof:isProfileOf`, base profiles first.
    pub fn profile_chain(&self, data: &Store, additional: &[String]) -> Result<Vec<String>> {
        let conforms_to = NamedNode::new_unchecked(format!("{DCT_NS}conformsTo"));
        let mut roots = Vec::new();
        for quad in data.quads_for_pattern(None, Some(conforms_to.as_ref()), None, None) {
            if let Term::NamedNode(profile) = quad?.object {
                roots.push(profile.into_string());
            }
        }
        roots.extend(additional.iter().cloned());

        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        for root in &roots {
            self.visit(root, &mut visited, &mut chain);
        }
        Ok(chain)
    }

    fn visit(&self, uri: &str, visited: &mut HashSet<String>, chain: &mut Vec<String>) {
        let Some(profile) = self.profiles.get(uri) else {
            return;
        };
        if !visited.insert(uri.to_string()) {
            return;
        }
        for parent in &profile.profile_of {
            self.visit(parent, visited, chain);
        }
        chain.push(uri.to_string());
    }

    /// Entail `data` with the entailment artifacts of its profile chain.
    /// The input graph is left untouched.
    pub fn entail(&self, data: &Store, additional: &[String]) -> Result<Entailment> {
        let graph = rdf::copy_graph(data)?;
        let chain = self.profile_chain(data, additional)?;
        for uri in &chain {
            let Some(profile) = self.profiles.get(uri) else {
                continue;
            };
            let mut rules = RuleSet::new();
            for artifact in profile.artifacts_for(ROLE_ENTAILMENT) {
                if let Some(loaded) = self.artifacts.get(artifact) {
                    rules.extend(loaded.rules.clone());
                }
            }
            if rules.is_empty() {
                continue;
            }
            let added = rules
                .apply(&graph)
                .with_context(|| format!("entailment failed for profile {uri}"))?;
            tracing::debug!(profile = %uri, added, "applied entailment rules");
        }
        Ok(Entailment {
            graph,
            profiles: chain,
        })
    }

    /// Validate `data` against the validation artifacts of its profile chain.
    pub fn validate(&self, data: &Store, additional: &[String]) -> Result<ValidationReport> {
        let mut report = ValidationReport::new();
        let mut seen = HashSet::new();
        for uri in self.profile_chain(data, additional)? {
            let Some(profile) = self.profiles.get(&uri) else {
                continue;
            };
            for artifact in profile.artifacts_for(ROLE_VALIDATION) {
                if !seen.insert(artifact.as_str()) {
                    continue;
                }
                let Some(validator) = self.artifacts.get(artifact).and_then(|a| a.validator.as_ref()) else {
                    continue;
                };
                validator.validate_into(data, &mut report)?;
            }
        }
        Ok(report)
    }
}

// =============================================================================
// Profile descriptions
// =============================================================================

fn first_text(store: &Store, subject: &NamedOrBlankNode, predicates: &[NamedNode]) -> Result<Option<String>> {
    for predicate in predicates {
        let texts: Vec<_> = rdf::objects(store, subject.as_ref(), predicate.as_ref())?
            .into_iter()
            .filter_map(|term| match term {
                Term::Literal(literal) => Some(literal),
                _ => None,
            })
            .collect();
        let preferred = texts
            .iter()
            .find(|l| l.language().is_none_or(|lang| lang.starts_with("en")))
            .or_else(|| texts.first());
        if let Some(literal) = preferred {
            return Ok(Some(literal.value().to_string()));
        }
    }
    Ok(None)
}

fn iri_or_text(term: Term) -> Option<String> {
    match term {
        Term::NamedNode(node) => Some(node.into_string()),
        Term::Literal(literal) => Some(literal.value().to_string()),
        _ => None,
    }
}

fn read_profiles(store: &Store) -> Result<IndexMap<String, Profile>> {
    let label_predicates = [
        rdfs::LABEL.into_owned(),
        NamedNode::new_unchecked(format!("{SKOS_NS}prefLabel")),
        NamedNode::new_unchecked(format!("{DCT_NS}title")),
    ];
    let profile_class: Term = prof("Profile").into();

    let mut subjects = rdf::subjects(store, rdf_vocab::TYPE, Some(profile_class.as_ref()))?;
    subjects.sort_by_key(|s| s.to_string());

    let mut profiles = IndexMap::new();
    for subject in subjects {
        let NamedOrBlankNode::NamedNode(uri) = &subject else {
            continue;
        };

        let mut artifacts: IndexMap<String, Vec<String>> = IndexMap::new();
        for resource in rdf::objects(store, subject.as_ref(), prof("hasResource").as_ref())? {
            let Some(resource) = rdf::as_subject(&resource) else {
                continue;
            };
            let roles = rdf::objects(store, resource, prof("hasRole").as_ref())?;
            let files: Vec<String> = rdf::objects(store, resource, prof("hasArtifact").as_ref())?
                .into_iter()
                .filter_map(iri_or_text)
                .collect();
            for role in roles.into_iter().filter_map(iri_or_text) {
                let entry = artifacts.entry(role).or_default();
                for file in &files {
                    if !entry.contains(file) {
                        entry.push(file.clone());
                    }
                }
            }
        }

        let profile_of = rdf::objects(store, subject.as_ref(), prof("isProfileOf").as_ref())?
            .into_iter()
            .filter_map(|term| match term {
                Term::NamedNode(node) => Some(node.into_string()),
                _ => None,
            })
            .collect();

        let profile = Profile {
            uri: uri.as_str().to_string(),
            label: first_text(store, &subject, &label_predicates)?,
            token: first_text(store, &subject, &[prof("hasToken")])?,
            profile_of,
            artifacts,
        };
        profiles.insert(profile.uri.clone(), profile);
    }
    Ok(profiles)
}

// =============================================================================
// Sources and artifacts
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Location {
    Url(String),
    File(PathBuf),
}

impl Location {
    fn base_iri(&self) -> Option<String> {
        match self {
            Location::Url(url) => Some(url.clone()),
            Location::File(path) => std::path::absolute(path)
                .ok()
                .and_then(|p| reqwest::Url::from_file_path(p).ok())
                .map(String::from),
        }
    }
}

fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

fn has_glob_syntax(source: &str) -> bool {
    source.contains(['*', '?', '[', '{'])
}

/// Expand configured sources to concrete locations.
fn expand_sources(sources: &[String]) -> Result<Vec<Location>> {
    let mut locations = Vec::new();
    for source in sources.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        if is_url(source) {
            locations.push(Location::Url(source.to_string()));
        } else if has_glob_syntax(source) {
            locations.extend(glob_files(source)?.into_iter().map(Location::File));
        } else {
            let path = PathBuf::from(source);
            if path.is_dir() {
                locations.extend(directory_files(&path).into_iter().map(Location::File));
            } else {
                locations.push(Location::File(path));
            }
        }
    }
    Ok(locations)
}

fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

fn directory_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && is_source_file(entry.path()))
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}

fn glob_files(pattern: &str) -> Result<Vec<PathBuf>> {
    let matcher = Glob::new(pattern)
        .with_context(|| format!("invalid profile source pattern {pattern}"))?
        .compile_matcher();

    // walk from the longest directory prefix without glob syntax
    let mut root = PathBuf::new();
    for component in Path::new(pattern).components() {
        let text = component.as_os_str().to_string_lossy();
        if has_glob_syntax(&text) {
            break;
        }
        root.push(component);
    }
    if root.as_os_str().is_empty() {
        root.push(".");
    }

    let mut files: Vec<PathBuf> = WalkDir::new(&root)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| matcher.is_match(path) || matcher.is_match(path.strip_prefix("./").unwrap_or(path)))
        .collect();
    files.sort();
    Ok(files)
}

async fn read_location(location: &Location, client: &reqwest::Client) -> Result<(Vec<u8>, String)> {
    match location {
        Location::Url(url) => {
            tracing::info!(url = %url, "fetching profile resource");
            let response = client
                .get(url)
                .send()
                .await
                .with_context(|| format!("failed to fetch {url}"))?
                .error_for_status()
                .with_context(|| format!("failed to fetch {url}"))?;
            let bytes = response.bytes().await?;
            let name = reqwest::Url::parse(url)
                .map(|u| u.path().to_string())
                .unwrap_or_else(|_| url.clone());
            Ok((bytes.to_vec(), name))
        }
        Location::File(path) => {
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            Ok((bytes, path.display().to_string()))
        }
    }
}

/// Where an artifact URI is read from, after applying local mappings.
/// The longest matching prefix wins.
fn artifact_location(uri: &str, mappings: &IndexMap<String, PathBuf>) -> Location {
    let mapped = mappings
        .iter()
        .filter(|(prefix, _)| uri.starts_with(prefix.as_str()))
        .max_by_key(|(prefix, _)| prefix.len());
    if let Some((prefix, dir)) = mapped {
        let rest = uri[prefix.len()..].trim_start_matches('/');
        return Location::File(dir.join(rest));
    }
    if is_url(uri) {
        return Location::Url(uri.to_string());
    }
    match reqwest::Url::parse(uri).ok().filter(|u| u.scheme() == "file").and_then(|u| u.to_file_path().ok()) {
        Some(path) => Location::File(path),
        None => Location::File(PathBuf::from(uri)),
    }
}

async fn load_artifact(uri: &str, options: &RegistryOptions) -> Result<LoadedArtifact> {
    let location = artifact_location(uri, &options.mappings);
    let (bytes, name) = read_location(&location, &options.client).await?;

    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".rq") || lower.ends_with(".sparql") {
        let query = String::from_utf8(bytes).context("SPARQL artifact is not UTF-8")?;
        return Ok(LoadedArtifact {
            validator: None,
            rules: RuleSet::from_construct(uri, &query),
        });
    }

    let syntax = GraphSyntax::from_extension(&name).unwrap_or_else(|| GraphSyntax::sniff(&bytes));
    let base = reqwest::Url::parse(uri).is_ok().then_some(uri);
    let graph = rdf::parse_any(syntax, &bytes, base)?;
    if graph.is_empty()? {
        bail!("artifact {uri} is empty");
    }
    Ok(LoadedArtifact {
        validator: Some(ShapeValidator::from_store(&graph)?),
        rules: RuleSet::from_shapes(&graph)?,
    })
}
