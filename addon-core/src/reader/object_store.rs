//! Object-store reader: a single prefix listing query against an
//! S3-compatible endpoint (spec.md §4.1).

use std::collections::BTreeMap;

use addon_definitions::registry::ObjectStoreSpec;
use addon_definitions::source::{Item, SourceMeta};
use addon_definitions::{AddonError, Result};
use serde::Deserialize;

use super::Reader;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListBucketResult {
    #[serde(default, rename = "Contents")]
    contents: Vec<Content>,
    #[serde(default, rename = "IsTruncated")]
    is_truncated: bool,
    #[serde(default, rename = "NextContinuationToken")]
    next_continuation_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "Size")]
    size: u64,
}

pub struct ObjectStoreReader {
    endpoint: String,
    bucket: String,
    path: String,
    client: reqwest::blocking::Client,
}

impl ObjectStoreReader {
    pub fn new(spec: &ObjectStoreSpec) -> Result<ObjectStoreReader> {
        let client = reqwest::blocking::Client::builder()
            .danger_accept_invalid_certs(spec.insecureSkipTLS)
            .build()
            .map_err(AddonError::transport)?;
        Ok(ObjectStoreReader {
            endpoint: spec.endpoint.trim_end_matches('/').to_string(),
            bucket: spec.bucket.clone(),
            path: spec.path.trim_matches('/').to_string(),
            client,
        })
    }

    fn list_page(&self, continuation_token: Option<&str>) -> Result<ListBucketResult> {
        let mut url = format!(
            "{}/{}?list-type=2&prefix={}",
            self.endpoint,
            self.bucket,
            urlencode(&self.path_prefix())
        );
        if let Some(tok) = continuation_token {
            url.push_str(&format!("&continuation-token={}", urlencode(tok)));
        }
        let resp = self.client.get(&url).send().map_err(AddonError::transport)?;
        if !resp.status().is_success() {
            bail!(AddonError::transport(format!("GET {} -> {}", url, resp.status())));
        }
        let body = resp.text().map_err(AddonError::transport)?;
        quick_xml::de::from_str(&body).map_err(|e| AddonError::parse("object-store listing", e).into())
    }

    fn path_prefix(&self) -> String {
        if self.path.is_empty() { String::new() } else { format!("{}/", self.path) }
    }
}

fn urlencode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

impl Reader for ObjectStoreReader {
    fn list_addon_meta(&self) -> Result<BTreeMap<String, SourceMeta>> {
        let prefix = self.path_prefix();
        let mut out: BTreeMap<String, SourceMeta> = BTreeMap::new();
        let mut token: Option<String> = None;
        loop {
            let page = self.list_page(token.as_deref())?;
            for c in &page.contents {
                // size 0 entries are directory placeholders and must be
                // filtered out (spec.md §4.1).
                if c.size == 0 {
                    continue;
                }
                let Some(rel) = c.key.strip_prefix(&prefix) else { continue };
                if rel.is_empty() {
                    continue;
                }
                let Some((addon, sub)) = rel.split_once('/') else { continue };
                if sub.is_empty() {
                    continue;
                }
                let rec = out.entry(addon.to_string()).or_insert_with(|| SourceMeta::new(addon));
                rec.items.push(Item::file(format!("{}/{}", addon, sub)));
            }
            if page.is_truncated {
                token = page.next_continuation_token;
                if token.is_none() {
                    break;
                }
            } else {
                break;
            }
        }
        // an addon is recognized only when `<addon>/metadata.yaml` exists
        out.retain(|_, meta| meta.has_metadata());
        Ok(out.into_iter().map(|(k, v)| (k.clone(), v.sorted())).collect())
    }

    fn read_file(&self, relative_path: &str) -> Result<Vec<u8>> {
        let key = format!("{}{}", self.path_prefix(), relative_path);
        let url = format!("{}/{}/{}", self.endpoint, self.bucket, key);
        let resp = self.client.get(&url).send().map_err(AddonError::transport)?;
        if !resp.status().is_success() {
            bail!(AddonError::not_found("file", relative_path));
        }
        Ok(resp.bytes().map_err(AddonError::transport)?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_list_bucket_xml() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult>
  <IsTruncated>false</IsTruncated>
  <Contents><Key>catalog/demo/</Key><Size>0</Size></Contents>
  <Contents><Key>catalog/demo/metadata.yaml</Key><Size>42</Size></Contents>
  <Contents><Key>catalog/demo/resources/deploy.cue</Key><Size>10</Size></Contents>
</ListBucketResult>"#;
        let parsed: ListBucketResult = quick_xml::de::from_str(xml).unwrap();
        assert_eq!(parsed.contents.len(), 3);
        assert!(!parsed.is_truncated);
    }

}
