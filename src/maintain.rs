//! Channel Maintenance
//!
//! The only code paths that write channel files: canonical sorting and
//! rewriting permanently redirected `details` URLs. The validator itself
//! never modifies anything.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use reqwest::blocking::Client;
use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;
use walkdir::WalkDir;

use crate::config::ValidatorConfig;
use crate::error::{ChannelError, Result};
use crate::loader::{canonical_json, Document, Location};
use crate::validate::package::record_name;
use crate::validate::repository::DEPENDENCIES_FILE;

/// Upper bound on chained redirects followed for one URL
const MAX_REDIRECT_HOPS: usize = 5;

/// A `details` URL that has moved permanently
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Redirect {
    pub file: PathBuf,
    pub package: String,
    pub from: String,
    pub to: String,
}

/// Sorts and rewrites the files of a channel checkout
pub struct Maintainer {
    config: ValidatorConfig,
    root: PathBuf,
}

impl Maintainer {
    pub fn new(config: ValidatorConfig, root: impl Into<PathBuf>) -> Self {
        Self {
            config,
            root: root.into(),
        }
    }

    /// Sort the channel and every repository file into canonical form.
    ///
    /// Returns the files whose content changed (or would change, when
    /// `write` is false).
    pub fn sort(&self, write: bool) -> Result<Vec<PathBuf>> {
        let mut changed = Vec::new();

        let channel_path = self.config.channel_path(&self.root);
        let leading = self.config.validation.unsorted_leading_repositories;
        if self.rewrite(&channel_path, write, |value| sort_repositories(value, leading))? {
            changed.push(channel_path);
        }

        for path in self.repository_files()? {
            if self.rewrite(&path, write, sort_records)? {
                changed.push(path);
            }
        }

        info!(changed = changed.len(), write, "sort finished");
        Ok(changed)
    }

    /// HEAD every package `details` URL and collect the ones answering 301
    pub fn find_redirects(&self) -> Result<Vec<Redirect>> {
        let client = Client::builder()
            .redirect(Policy::none())
            .timeout(self.config.http.timeout())
            .user_agent(self.config.http.user_agent.clone())
            .build()?;

        let mut redirects = Vec::new();
        for path in self.repository_files()? {
            if path.file_name().map_or(false, |n| n == DEPENDENCIES_FILE) {
                continue;
            }
            let document = load_local(&path)?;
            for record in records(&document.value, "packages") {
                let Some(details) = record.get("details").and_then(Value::as_str) else {
                    continue;
                };
                let Some(package) = record_name(record) else {
                    continue;
                };
                thread::sleep(self.config.http.request_delay());
                match resolve_moved(&client, details) {
                    Ok(Some(to)) => {
                        debug!(package = %package, from = details, to = %to, "permanent redirect");
                        redirects.push(Redirect {
                            file: path.clone(),
                            package,
                            from: details.to_string(),
                            to,
                        });
                    }
                    Ok(None) => {}
                    Err(err) => warn!(package = %package, error = %err, "redirect check failed"),
                }
            }
        }
        Ok(redirects)
    }

    /// Replace redirected `details` URLs in place. Returns the number of
    /// URLs rewritten.
    pub fn apply_redirects(&self, redirects: &[Redirect]) -> Result<usize> {
        let mut applied = 0;
        let mut files: Vec<&Path> = redirects.iter().map(|r| r.file.as_path()).collect();
        files.dedup();

        for file in files {
            self.rewrite(file, true, |value| {
                let Some(packages) = value.get_mut("packages").and_then(Value::as_array_mut) else {
                    return;
                };
                for record in packages {
                    let Some(details) = record.get_mut("details") else {
                        continue;
                    };
                    let current = details.as_str().unwrap_or_default();
                    if let Some(r) = redirects.iter().find(|r| r.file == file && r.from == current) {
                        *details = Value::String(r.to.clone());
                        applied += 1;
                    }
                }
            })?;
        }
        Ok(applied)
    }

    fn repository_files(&self) -> Result<Vec<PathBuf>> {
        let dir = self.config.repository_dir(&self.root);
        let mut files = Vec::new();
        for entry in WalkDir::new(&dir).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| ChannelError::Io {
                location: dir.display().to_string(),
                source: e.into(),
            })?;
            let path = entry.path();
            if path.is_file() && path.extension().map_or(false, |ext| ext == "json") {
                files.push(path.to_path_buf());
            }
        }
        Ok(files)
    }

    /// Apply `edit` to a file and write back its canonical form if the
    /// text differs
    fn rewrite(&self, path: &Path, write: bool, edit: impl FnOnce(&mut Value)) -> Result<bool> {
        let mut document = load_local(path)?;
        edit(&mut document.value);
        let canonical = canonical_json(&document.value)?;
        if canonical == document.raw {
            return Ok(false);
        }
        if write {
            debug!(path = %path.display(), "rewriting");
            fs::write(path, canonical).map_err(|source| ChannelError::Io {
                location: path.display().to_string(),
                source,
            })?;
        }
        Ok(true)
    }
}

fn load_local(path: &Path) -> Result<Document> {
    let location = Location::Path(path.to_path_buf());
    let bytes = fs::read(path).map_err(|source| ChannelError::Io {
        location: location.to_string(),
        source,
    })?;
    Document::from_bytes(location, bytes)
}

fn records<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Sort the channel's repositories, keeping the first `leading` in place
pub fn sort_repositories(channel: &mut Value, leading: usize) {
    let Some(repositories) = channel.get_mut("repositories").and_then(Value::as_array_mut) else {
        return;
    };
    if repositories.len() > leading {
        repositories[leading..].sort_by_key(|r| r.as_str().unwrap_or_default().to_lowercase());
    }
}

/// Sort a repository's packages and dependencies by lowercased name
pub fn sort_records(repository: &mut Value) {
    for key in ["packages", "dependencies"] {
        if let Some(items) = repository.get_mut(key).and_then(Value::as_array_mut) {
            items.sort_by_key(|record| record_name(record).unwrap_or_default().to_lowercase());
        }
    }
}

/// Where `url` ends up when it answers 301. Any further redirects are
/// followed to the final URL. `None` if the URL does not move permanently
/// or the redirects lead back to it.
fn resolve_moved(client: &Client, url: &str) -> Result<Option<String>> {
    let start = Url::parse(url).map_err(|_| ChannelError::InvalidReference {
        location: url.to_string(),
        reference: url.to_string(),
    })?;

    let mut response = client.head(start.clone()).send()?;
    if response.status() != StatusCode::MOVED_PERMANENTLY {
        return Ok(None);
    }

    let mut current = start.clone();
    for _ in 0..MAX_REDIRECT_HOPS {
        if !response.status().is_redirection() {
            break;
        }
        let Some(target) = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
        else {
            break;
        };
        current = current.join(&target).map_err(|_| ChannelError::InvalidReference {
            location: current.to_string(),
            reference: target.clone(),
        })?;
        response = client.head(current.clone()).send()?;
    }

    if current == start {
        warn!(url = %start, "redirected to same URL");
        return Ok(None);
    }
    Ok(Some(current.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{response, ScriptedServer};
    use serde_json::json;

    fn no_redirect_client() -> Client {
        Client::builder().redirect(Policy::none()).build().unwrap()
    }

    #[test]
    fn test_sort_repositories_keeps_leading() {
        let mut channel = json!({
            "repositories": ["./repository.json", "https://z.org/p.json", "https://B.org/p.json", "https://a.org/p.json"]
        });
        sort_repositories(&mut channel, 1);
        assert_eq!(
            channel["repositories"],
            json!(["./repository.json", "https://a.org/p.json", "https://B.org/p.json", "https://z.org/p.json"])
        );
    }

    #[test]
    fn test_sort_records_by_effective_name() {
        let mut repository = json!({
            "packages": [
                { "details": "https://github.com/x/beta" },
                { "name": "Alpha" },
                { "details": "https://github.com/x/Aardvark" }
            ],
            "dependencies": [{ "name": "ssl" }, { "name": "bz2" }]
        });
        sort_records(&mut repository);
        let names: Vec<_> = records(&repository, "packages").iter().filter_map(record_name).collect();
        assert_eq!(names, vec!["Aardvark", "Alpha", "beta"]);
        assert_eq!(repository["dependencies"][0]["name"], "bz2");
    }

    #[test]
    fn test_sort_check_then_write() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("repository")).unwrap();
        fs::write(
            dir.path().join("channel.json"),
            "{\n\t\"schema_version\": \"3.0.0\",\n\t\"repositories\": [\n\t\t\"./repository.json\"\n\t]\n}\n",
        )
        .unwrap();
        let shard = dir.path().join("repository/b.json");
        fs::write(
            &shard,
            r#"{"schema_version": "3.0.0", "packages": [{"name": "Bz"}, {"name": "ba"}]}"#,
        )
        .unwrap();

        let maintainer = Maintainer::new(ValidatorConfig::default(), dir.path());
        let changed = maintainer.sort(false).unwrap();
        assert_eq!(changed, vec![shard.clone()]);
        // check mode leaves files alone
        assert!(fs::read_to_string(&shard).unwrap().starts_with("{\"schema_version\""));

        maintainer.sort(true).unwrap();
        let written = fs::read_to_string(&shard).unwrap();
        assert!(written.contains("\t\t{\n\t\t\t\"name\": \"ba\"\n\t\t},"));
        assert!(maintainer.sort(false).unwrap().is_empty());
    }

    #[test]
    fn test_apply_redirects() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("repository")).unwrap();
        let shard = dir.path().join("repository/o.json");
        fs::write(
            &shard,
            r#"{"schema_version": "3.0.0", "packages": [{"details": "https://github.com/old/Oak"}]}"#,
        )
        .unwrap();

        let maintainer = Maintainer::new(ValidatorConfig::default(), dir.path());
        let applied = maintainer
            .apply_redirects(&[Redirect {
                file: shard.clone(),
                package: "Oak".to_string(),
                from: "https://github.com/old/Oak".to_string(),
                to: "https://github.com/new/Oak".to_string(),
            }])
            .unwrap();
        assert_eq!(applied, 1);
        assert!(fs::read_to_string(&shard).unwrap().contains("https://github.com/new/Oak"));
    }

    #[test]
    fn test_resolve_moved_takes_final_url() {
        let server = ScriptedServer::start(|base| {
            vec![
                response("301 Moved Permanently", &[("Location", "/renamed/Oak")], ""),
                response("302 Found", &[("Location", &format!("{}/final/Oak", base))], ""),
                response("200 OK", &[], ""),
            ]
        });

        let moved = resolve_moved(&no_redirect_client(), &server.url("/old/Oak")).unwrap();
        assert_eq!(moved, Some(server.url("/final/Oak")));
        assert_eq!(server.hits(), 3);
    }

    #[test]
    fn test_resolve_moved_ignores_temporary_redirects() {
        let server = ScriptedServer::start(|_| {
            vec![response("302 Found", &[("Location", "/elsewhere")], "")]
        });

        let moved = resolve_moved(&no_redirect_client(), &server.url("/old/Oak")).unwrap();
        assert_eq!(moved, None);
        assert_eq!(server.hits(), 1);
    }

    #[test]
    fn test_resolve_moved_back_to_same_url() {
        let server = ScriptedServer::start(|_| {
            vec![
                response("301 Moved Permanently", &[("Location", "/tmp/Oak")], ""),
                response("301 Moved Permanently", &[("Location", "/old/Oak")], ""),
                response("200 OK", &[], ""),
            ]
        });

        let moved = resolve_moved(&no_redirect_client(), &server.url("/old/Oak")).unwrap();
        assert_eq!(moved, None);
    }

    #[test]
    fn test_find_redirects_skips_dependencies() {
        let server = ScriptedServer::start(|_| {
            vec![
                response("301 Moved Permanently", &[("Location", "/new/Oak")], ""),
                response("200 OK", &[], ""),
            ]
        });
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("repository")).unwrap();
        let shard = dir.path().join("repository/o.json");
        fs::write(
            &shard,
            canonical_json(&json!({
                "schema_version": "3.0.0",
                "packages": [{ "name": "Oak", "details": server.url("/old/Oak") }]
            }))
            .unwrap(),
        )
        .unwrap();
        fs::write(
            dir.path().join("repository/dependencies.json"),
            canonical_json(&json!({
                "schema_version": "3.0.0",
                "packages": [{ "name": "ssl", "details": server.url("/old/ssl") }]
            }))
            .unwrap(),
        )
        .unwrap();

        let mut config = ValidatorConfig::default();
        config.http.request_delay_ms = 0;
        let maintainer = Maintainer::new(config, dir.path());
        let redirects = maintainer.find_redirects().unwrap();

        assert_eq!(
            redirects,
            vec![Redirect {
                file: shard,
                package: "Oak".to_string(),
                from: server.url("/old/Oak"),
                to: server.url("/new/Oak"),
            }]
        );
        assert_eq!(server.hits(), 2);
    }
}
