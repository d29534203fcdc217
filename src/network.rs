// This file's job is to deal with the release source and network side of
// the updater library.

use std::cmp;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use anyhow::Context;
use indicatif::ProgressBar;
use log::{debug, info};
use serde::Deserialize;

use crate::console::{self, MessageKind};
use crate::updater::UpdateError;

/// Number of discrete steps in the download progress indicator.
const PROGRESS_STEPS: u64 = 100;

/// The body of the release metadata endpoint. Field names are contractual
/// to the remote API (the hosted-git release shape) and are not renamed.
#[derive(Debug, Deserialize)]
pub struct ReleaseCheckResponse {
    pub tag_name: String,
    pub tarball_url: String,
}

/// Handles the result of a network request, returning the response if it
/// was successful, `UpdateError::Http` if the status was not a success, or
/// `UpdateError::Connection` if the transport itself failed.
fn handle_network_result(
    result: Result<reqwest::blocking::Response, reqwest::Error>,
) -> anyhow::Result<reqwest::blocking::Response> {
    match result {
        Ok(response) => {
            let status = response.status();
            if status.is_success() {
                Ok(response)
            } else {
                Err(UpdateError::Http(status.to_string()).into())
            }
        }
        Err(e) => Err(UpdateError::Connection(e.to_string()).into()),
    }
}

/// Fetches release metadata from the given URL.
///
/// The request asks for an identity transfer encoding so Content-Length
/// stays byte-accurate on this endpoint family (the tarball download reads
/// it for progress reporting).
pub fn send_release_check_request(url: &str) -> anyhow::Result<ReleaseCheckResponse> {
    debug!("Sending release check request to {url}");
    let client = reqwest::blocking::Client::new();
    let result = client
        .get(url)
        .header(reqwest::header::ACCEPT_ENCODING, "identity")
        .send();
    let response = handle_network_result(result)?;
    response.json().map_err(|e| {
        debug!("Malformed release check response: {e}");
        UpdateError::BadServerResponse.into()
    })
}

/// Streams the body at `url` to `path` without buffering it in memory.
///
/// When the response declares a Content-Length, the body is read in fixed
/// chunks of `floor(total / 99)` bytes and a 100-step progress bar is
/// advanced once per chunk, landing at ~99-100 steps by completion. When
/// the length is missing the body is streamed without progress reporting.
pub fn download_to_path(url: &str, path: &Path) -> anyhow::Result<()> {
    debug!("Downloading release from: {url}");
    let client = reqwest::blocking::Client::new();
    let result = client
        .get(url)
        .header(reqwest::header::ACCEPT_ENCODING, "identity")
        .send();
    let response = handle_network_result(result)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create_dir_all failed for {}", parent.display()))?;
    }
    debug!("Writing download to: {:?}", path);
    let file =
        File::create(path).with_context(|| format!("File::create for {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    let total_size = response.content_length();
    let mut body = response;
    match total_size {
        None => {
            info!("Release length unavailable");
            console::say(MessageKind::Info, "Release length unavailable");
            io::copy(&mut body, &mut writer)?;
        }
        Some(total) => {
            // 99 full chunks plus a short tail; clamp so tiny bodies don't
            // degenerate to zero-byte reads.
            let chunk_size = cmp::max(1, total / (PROGRESS_STEPS - 1)) as usize;
            let bar = ProgressBar::new(PROGRESS_STEPS);
            let mut chunk = vec![0u8; chunk_size];
            loop {
                let read = read_chunk(&mut body, &mut chunk)?;
                if read == 0 {
                    break;
                }
                // Each chunk is fully written before the next is requested.
                writer.write_all(&chunk[..read])?;
                bar.inc(1);
            }
            bar.finish();
        }
    }
    writer.flush()?;
    Ok(())
}

/// Reads until `buf` is full or the stream ends; returns the bytes read.
fn read_chunk<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use tempdir::TempDir;

    use crate::updater::UpdateError;

    use super::{download_to_path, read_chunk, send_release_check_request};

    #[test]
    fn release_check_parses_contractual_fields() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/release")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"tag_name":"v1.2.3","tarball_url":"https://example.com/v1.2.3.tar.gz","other":"ignored"}"#)
            .create();

        let response = send_release_check_request(&format!("{}/release", server.url())).unwrap();
        assert_eq!(response.tag_name, "v1.2.3");
        assert_eq!(response.tarball_url, "https://example.com/v1.2.3.tar.gz");
    }

    #[test]
    fn release_check_sends_identity_encoding() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/release")
            .match_header("accept-encoding", "identity")
            .with_status(200)
            .with_body(r#"{"tag_name":"v1","tarball_url":"u"}"#)
            .create();

        send_release_check_request(&format!("{}/release", server.url())).unwrap();
        mock.assert();
    }

    #[test]
    fn release_check_http_error_on_bad_status() {
        let mut server = mockito::Server::new();
        let _mock = server.mock("GET", "/release").with_status(500).create();

        let err = send_release_check_request(&format!("{}/release", server.url())).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<UpdateError>(),
            Some(UpdateError::Http(_))
        ));
    }

    #[test]
    fn release_check_connection_error_when_unreachable() {
        // Nothing is listening on this address.
        let err = send_release_check_request("http://127.0.0.1:9/release").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<UpdateError>(),
            Some(UpdateError::Connection(_))
        ));
    }

    #[test]
    fn release_check_bad_body_is_bad_server_response() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/release")
            .with_status(200)
            .with_body("not json")
            .create();

        let err = send_release_check_request(&format!("{}/release", server.url())).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<UpdateError>(),
            Some(UpdateError::BadServerResponse)
        ));
    }

    #[test]
    fn download_with_content_length_writes_whole_body() {
        let body: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/tarball")
            .with_status(200)
            .with_body(&body)
            .create();

        let tmp_dir = TempDir::new("download").unwrap();
        let path = tmp_dir.path().join("release.tar.gz");
        download_to_path(&format!("{}/tarball", server.url()), &path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), body);
    }

    #[test]
    fn download_without_content_length_still_writes_body() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/tarball")
            .with_status(200)
            // Chunked transfer, so no Content-Length header.
            .with_chunked_body(|w| w.write_all(b"streamed bytes"))
            .create();

        let tmp_dir = TempDir::new("download").unwrap();
        let path = tmp_dir.path().join("release.tar.gz");
        download_to_path(&format!("{}/tarball", server.url()), &path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"streamed bytes");
    }

    #[test]
    fn download_http_error_on_bad_status() {
        let mut server = mockito::Server::new();
        let _mock = server.mock("GET", "/tarball").with_status(404).create();

        let tmp_dir = TempDir::new("download").unwrap();
        let path = tmp_dir.path().join("release.tar.gz");
        let err = download_to_path(&format!("{}/tarball", server.url()), &path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<UpdateError>(),
            Some(UpdateError::Http(_))
        ));
        assert!(!path.exists());
    }

    #[test]
    fn read_chunk_fills_and_then_drains() {
        let data = b"abcdefg";
        let mut reader = &data[..];
        let mut buf = [0u8; 4];
        assert_eq!(read_chunk(&mut reader, &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(read_chunk(&mut reader, &mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"efg");
        assert_eq!(read_chunk(&mut reader, &mut buf).unwrap(), 0);
    }
}
