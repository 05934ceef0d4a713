//! End-to-end smoke tests live under `tests/`. They start the gateway router on
//! an ephemeral port and drive it over HTTP against the database named by
//! `TENANTRY_TEST_DB_URL` (or `DATABASE_URL`), and skip when neither is set.
