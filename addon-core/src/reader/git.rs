//! Git reader: a single repository tree listing at the base path
//! produces the per-addon directory entries, each walked recursively
//! (spec.md §4.1). Only GitHub is supported; other hosts fail at
//! construction.

use std::collections::BTreeMap;

use addon_definitions::registry::GitSpec;
use addon_definitions::source::{Item, SourceMeta};
use addon_definitions::{AddonError, Result};

use super::Reader;

#[derive(Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct TreeResponse {
    tree: Vec<TreeEntry>,
    truncated: bool,
}

#[derive(Deserialize)]
struct RepoInfo {
    default_branch: String,
}

pub struct GitReader {
    owner: String,
    repo: String,
    path: String,
    token: Option<String>,
    client: reqwest::blocking::Client,
    api_base: String,
}

impl GitReader {
    /// Parses `https://github.com/<owner>/<repo>` (optionally with a
    /// trailing `.git` or path suffix). Any other host fails immediately
    /// with a clear error, per spec.md §4.1.
    pub fn new(spec: &GitSpec) -> Result<GitReader> {
        let url = url::Url::parse(&spec.url).map_err(|e| AddonError::invalid_package(format!(
            "git registry url '{}' is not a valid URL: {}", spec.url, e
        )))?;
        let host = url.host_str().unwrap_or_default();
        if host != "github.com" {
            bail!(AddonError::invalid_package(format!(
                "unsupported git host '{}': only github.com repositories are supported", host
            )));
        }
        let mut segments: Vec<&str> =
            url.path_segments().map(|s| s.filter(|seg| !seg.is_empty()).collect()).unwrap_or_default();
        if segments.len() < 2 {
            bail!(AddonError::invalid_package(format!(
                "git registry url '{}' must be https://github.com/<owner>/<repo>", spec.url
            )));
        }
        let owner = segments.remove(0).to_string();
        let mut repo = segments.remove(0).to_string();
        if let Some(stripped) = repo.strip_suffix(".git") {
            repo = stripped.to_string();
        }

        let client = reqwest::blocking::Client::builder()
            .user_agent("addon-core")
            .build()
            .map_err(AddonError::transport)?;

        Ok(GitReader {
            owner,
            repo,
            path: spec.path.trim_matches('/').to_string(),
            token: spec.token.clone(),
            client,
            api_base: "https://api.github.com".to_string(),
        })
    }

    fn request(&self, url: &str) -> reqwest::blocking::RequestBuilder {
        let mut req = self.client.get(url).header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        req
    }

    fn default_branch(&self) -> Result<String> {
        let url = format!("{}/repos/{}/{}", self.api_base, self.owner, self.repo);
        let resp = self.request(&url).send().map_err(AddonError::transport)?;
        if !resp.status().is_success() {
            bail!(AddonError::transport(format!("GET {} -> {}", url, resp.status())));
        }
        let info: RepoInfo = resp.json().map_err(AddonError::transport)?;
        Ok(info.default_branch)
    }

    fn full_tree(&self) -> Result<TreeResponse> {
        let branch = self.default_branch()?;
        let url = format!(
            "{}/repos/{}/{}/git/trees/{}?recursive=1",
            self.api_base, self.owner, self.repo, branch
        );
        let resp = self.request(&url).send().map_err(AddonError::transport)?;
        if !resp.status().is_success() {
            bail!(AddonError::transport(format!("GET {} -> {}", url, resp.status())));
        }
        let tree: TreeResponse = resp.json().map_err(AddonError::transport)?;
        if tree.truncated {
            warn!("git tree listing for {}/{} was truncated by the GitHub API", self.owner, self.repo);
        }
        Ok(tree)
    }
}

impl Reader for GitReader {
    fn list_addon_meta(&self) -> Result<BTreeMap<String, SourceMeta>> {
        let tree = self.full_tree()?;
        let prefix = if self.path.is_empty() { String::new() } else { format!("{}/", self.path) };
        let mut out: BTreeMap<String, SourceMeta> = BTreeMap::new();
        for entry in &tree.tree {
            let Some(rel) = entry.path.strip_prefix(&prefix) else { continue };
            if rel.is_empty() {
                continue;
            }
            let Some((addon, sub)) = rel.split_once('/') else {
                // a bare file directly under the base path belongs to no addon
                continue;
            };
            let item_path = format!("{}/{}", addon, sub);
            let rec = out.entry(addon.to_string()).or_insert_with(|| SourceMeta::new(addon));
            if entry.kind == "tree" {
                rec.items.push(Item::dir(item_path));
            } else {
                rec.items.push(Item::file(item_path));
            }
        }
        // an addon is recognized only when `<addon>/metadata.yaml` exists
        // (spec.md §8), same filter the object-store reader applies.
        out.retain(|_, meta| meta.has_metadata());
        Ok(out.into_iter().map(|(k, v)| (k.clone(), v.sorted())).collect())
    }

    fn read_file(&self, relative_path: &str) -> Result<Vec<u8>> {
        let full_path = if self.path.is_empty() {
            relative_path.to_string()
        } else {
            format!("{}/{}", self.path, relative_path)
        };
        let branch = self.default_branch()?;
        let url = format!(
            "https://raw.githubusercontent.com/{}/{}/{}/{}",
            self.owner, self.repo, branch, full_path
        );
        let resp = self.request(&url).send().map_err(AddonError::transport)?;
        if !resp.status().is_success() {
            bail!(AddonError::not_found("file", full_path));
        }
        Ok(resp.bytes().map_err(AddonError::transport)?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_github_hosts() {
        let spec = GitSpec { url: "https://gitlab.com/acme/addons".into(), path: String::new(), token: None };
        assert!(GitReader::new(&spec).is_err());
    }

    #[test]
    fn parses_owner_and_repo() {
        let spec = GitSpec { url: "https://github.com/acme/addons.git".into(), path: "catalog".into(), token: None };
        let reader = GitReader::new(&spec).unwrap();
        assert_eq!(reader.owner, "acme");
        assert_eq!(reader.repo, "addons");
        assert_eq!(reader.path, "catalog");
    }
}
