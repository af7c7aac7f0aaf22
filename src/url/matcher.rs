/// Checks if a host is the site host itself or one of its subdomains
///
/// # Examples
///
/// ```
/// use crawl_lab::url::is_same_or_subdomain;
///
/// assert!(is_same_or_subdomain("example.com", "example.com"));
/// assert!(is_same_or_subdomain("example.com", "blog.example.com"));
/// assert!(!is_same_or_subdomain("example.com", "myexample.com"));
/// ```
pub fn is_same_or_subdomain(site: &str, candidate: &str) -> bool {
    candidate == site
        || candidate
            .strip_suffix(site)
            .is_some_and(|prefix| prefix.ends_with('.'))
}
