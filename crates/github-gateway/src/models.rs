//! Wire types for the subset of the GitHub REST API the gateway uses.
//!
//! Response types only name the fields that are read; everything else the
//! API returns is ignored.

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RepositoryDto {
    pub name: String,
    pub full_name: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub archived: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TreeDto {
    pub tree: Vec<TreeEntryDto>,
    #[serde(default)]
    pub truncated: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TreeEntryDto {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// `GET /contents/{path}` answers with an object for a file and an array
/// for a directory.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ContentsDto {
    Directory(Vec<ContentEntryDto>),
    Entry(ContentEntryDto),
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContentEntryDto {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub sha: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RefDto {
    pub object: RefObjectDto,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RefObjectDto {
    pub sha: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateRefBody<'a> {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub sha: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct PutContentsBody<'a> {
    pub message: &'a str,
    /// Base64 of the file bytes.
    pub content: String,
    pub branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PullRequestDto {
    pub number: u64,
    pub html_url: String,
    #[serde(default)]
    pub title: String,
    pub head: PullRefDto,
    pub base: PullRefDto,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PullRefDto {
    #[serde(rename = "ref")]
    pub git_ref: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreatePullBody<'a> {
    pub title: &'a str,
    pub body: &'a str,
    pub head: &'a str,
    pub base: &'a str,
}
