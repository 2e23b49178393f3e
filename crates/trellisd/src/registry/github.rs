//! Registry listing the repositories of a GitHub organisation.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use super::{RegistryClient, RegistryEntry, RegistryError};

const GITHUB_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::registry::github");

/// Repositories requested per page.
const PAGE_SIZE: usize = 100;

/// Upper bound on pages walked per listing.
const MAX_PAGES: usize = 50;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Manifest whose presence marks a repository as a plugin.
const MANIFEST_PATH: &str = "plugin.json";

#[derive(Debug, Deserialize)]
struct Repository {
    name: String,
    #[serde(default)]
    description: Option<String>,
    clone_url: String,
}

/// Lists an organisation's repositories through the GitHub REST API.
///
/// A repository is a plugin when `plugin.json` exists at its root; that
/// costs one extra request per repository.
#[derive(Debug, Clone)]
pub struct GithubOrganisationRegistry {
    api: Url,
    organisation: String,
    agent: ureq::Agent,
}

impl GithubOrganisationRegistry {
    /// Creates a client for `organisation` against the API rooted at `api`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidEndpoint`] when `api` is not an
    /// absolute URL that can carry a path.
    pub fn new(api: &str, organisation: impl Into<String>) -> Result<Self, RegistryError> {
        let invalid = |message: String| RegistryError::InvalidEndpoint {
            endpoint: api.to_owned(),
            message,
        };
        let parsed = Url::parse(api).map_err(|err| invalid(err.to_string()))?;
        if parsed.cannot_be_a_base() {
            return Err(invalid(String::from("URL cannot carry a path")));
        }
        Ok(Self {
            api: parsed,
            organisation: organisation.into(),
            agent: ureq::AgentBuilder::new()
                .timeout(REQUEST_TIMEOUT)
                .user_agent(USER_AGENT)
                .build(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.api.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn repositories_page(&self, page: usize) -> Result<Vec<Repository>, RegistryError> {
        let mut url = self.endpoint(&["orgs", &self.organisation, "repos"]);
        url.query_pairs_mut()
            .append_pair("per_page", &PAGE_SIZE.to_string())
            .append_pair("page", &page.to_string());
        let response = self.get(&url)?;
        response
            .into_json::<Vec<Repository>>()
            .map_err(|err| RegistryError::Decode {
                url: url.to_string(),
                message: err.to_string(),
            })
    }

    fn has_manifest(&self, repository: &str) -> Result<bool, RegistryError> {
        let url = self.endpoint(&[
            "repos",
            &self.organisation,
            repository,
            "contents",
            MANIFEST_PATH,
        ]);
        match self.get(&url) {
            Ok(_) => Ok(true),
            Err(RegistryError::Status { status: 404, .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn get(&self, url: &Url) -> Result<ureq::Response, RegistryError> {
        match self
            .agent
            .get(url.as_str())
            .set("Accept", "application/vnd.github+json")
            .call()
        {
            Ok(response) => Ok(response),
            Err(ureq::Error::Status(status, _)) => Err(RegistryError::Status {
                url: url.to_string(),
                status,
            }),
            Err(ureq::Error::Transport(transport)) => Err(RegistryError::Request {
                url: url.to_string(),
                message: transport.to_string(),
            }),
        }
    }
}

impl RegistryClient for GithubOrganisationRegistry {
    fn list_entries(&self) -> Result<Vec<RegistryEntry>, RegistryError> {
        let mut entries = Vec::new();
        for page in 1..=MAX_PAGES {
            let repositories = self.repositories_page(page)?;
            let last_page = repositories.len() < PAGE_SIZE;
            for repository in repositories {
                let is_plugin = self.has_manifest(&repository.name)?;
                debug!(
                    target: GITHUB_TARGET,
                    repository = %repository.name,
                    is_plugin,
                    "repository inspected"
                );
                entries.push(RegistryEntry {
                    name: repository.name,
                    description: repository.description.unwrap_or_default(),
                    url: repository.clone_url,
                    is_plugin,
                });
            }
            if last_page {
                break;
            }
        }
        info!(
            target: GITHUB_TARGET,
            organisation = %self.organisation,
            repositories = entries.len(),
            "organisation listed"
        );
        Ok(entries)
    }
}
