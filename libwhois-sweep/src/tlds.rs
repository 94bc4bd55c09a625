use reqwest::Client;
use thiserror::Error;
use tracing::info;

pub const IANA_TLD_LIST_URL: &str = "https://data.iana.org/TLD/tlds-alpha-by-domain.txt";

#[derive(Debug, Error)]
pub enum TldError {
    #[error("Failed to fetch TLD list: {0}")]
    FetchError(#[from] reqwest::Error),
    #[error("TLD list was empty")]
    Empty,
}

pub async fn fetch_iana_tlds(client: &Client) -> Result<Vec<String>, TldError> {
    let response = client
        .get(IANA_TLD_LIST_URL)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    let tlds = parse_tld_list(&response);
    if tlds.is_empty() {
        return Err(TldError::Empty);
    }

    info!(count = tlds.len(), "found TLDs");
    Ok(tlds)
}

/// Skips `#` comments and blank lines. Entries keep their case.
pub fn parse_tld_list(body: &str) -> Vec<String> {
    body.lines()
        .filter(|line| !line.starts_with('#'))
        .map(str::trim)
        .filter(|tld| !tld.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_iana_list() {
        let body = "# Version 2026101600, Last Updated Fri Oct 16 07:07:01 2026 UTC\nAAA\nAARP\n\nXN--P1AI\r\nZW\n";
        assert_eq!(parse_tld_list(body), vec!["AAA", "AARP", "XN--P1AI", "ZW"]);
    }

    #[test]
    fn comment_only_list_is_empty() {
        assert!(parse_tld_list("# nothing here\n\n").is_empty());
    }
}
