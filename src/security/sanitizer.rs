//! Redaction helpers for logging
//!
//! Credentials and user identifiers pass through here before they are
//! formatted into a tracing event.

/// Redacts sensitive values for logs and error messages
pub struct Sanitizer;

impl Sanitizer {
    /// Redacts a bearer token, keeping only its last four characters
    ///
    /// # Examples
    ///
    /// ```
    /// use placeprep_client::security::Sanitizer;
    ///
    /// assert_eq!(Sanitizer::sanitize_token("eyJhbGciOiJIUzI1NiJ9.abcd"), "***abcd");
    /// assert_eq!(Sanitizer::sanitize_token("abc"), "****");
    /// ```
    pub fn sanitize_token(token: &str) -> String {
        let count = token.chars().count();
        if count > 4 {
            let tail: String = token.chars().skip(count - 4).collect();
            format!("***{}", tail)
        } else {
            "****".to_string()
        }
    }

    /// Redacts the local part of an email address
    ///
    /// ```
    /// use placeprep_client::security::Sanitizer;
    ///
    /// assert_eq!(Sanitizer::sanitize_email("priya@college.edu"), "pr...@college.edu");
    /// assert_eq!(Sanitizer::sanitize_email("no-at-sign"), "***");
    /// ```
    pub fn sanitize_email(email: &str) -> String {
        match email.split_once('@') {
            Some((local, domain)) if local.chars().count() > 2 => {
                let head: String = local.chars().take(2).collect();
                format!("{}...@{}", head, domain)
            }
            Some((_, domain)) => format!("***@{}", domain),
            None => "***".to_string(),
        }
    }

    /// Strips the query string and fragment from a URL
    pub fn sanitize_url(url: &str) -> &str {
        let end = url.find(['?', '#']).unwrap_or(url.len());
        &url[..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_token_keeps_tail() {
        assert_eq!(Sanitizer::sanitize_token("access-token-1234"), "***1234");
        assert_eq!(Sanitizer::sanitize_token("abcde"), "***bcde");
    }

    #[test]
    fn test_sanitize_token_short() {
        assert_eq!(Sanitizer::sanitize_token(""), "****");
        assert_eq!(Sanitizer::sanitize_token("abcd"), "****");
    }

    #[test]
    fn test_sanitize_token_multibyte() {
        assert_eq!(Sanitizer::sanitize_token("tökén-ünï"), "***-ünï");
    }

    #[test]
    fn test_sanitize_email() {
        assert_eq!(Sanitizer::sanitize_email("john.doe@example.com"), "jo...@example.com");
        assert_eq!(Sanitizer::sanitize_email("ab@domain.org"), "***@domain.org");
        assert_eq!(Sanitizer::sanitize_email(""), "***");
    }

    #[test]
    fn test_sanitize_url() {
        assert_eq!(
            Sanitizer::sanitize_url("http://localhost:8000/api/resume/analyze?target_role=SDE"),
            "http://localhost:8000/api/resume/analyze"
        );
        assert_eq!(
            Sanitizer::sanitize_url("https://example.com/page#section"),
            "https://example.com/page"
        );
        assert_eq!(Sanitizer::sanitize_url("/api/dashboard"), "/api/dashboard");
    }
}
