//! End-to-end tests for the mock over real TLS and HTTP/2 live in `tests/`.
