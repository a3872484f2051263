// ABOUTME: Human-readable dump of an issued certificate.
// ABOUTME: Key id, principals, validity window and extensions, one field per line.

use chrono::{DateTime, Utc};
use ssh_key::Certificate;
use std::io::{self, Write};

fn timestamp(secs: u64) -> String {
    DateTime::<Utc>::from_timestamp(secs as i64, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| secs.to_string())
}

pub fn print_certificate(cert: &Certificate, mut w: impl Write) -> io::Result<()> {
    writeln!(w, "id: {}", cert.key_id())?;
    writeln!(w, "principals:")?;
    for principal in cert.valid_principals() {
        writeln!(w, "  - {principal}")?;
    }
    writeln!(w, "valid_after: {}", timestamp(cert.valid_after()))?;
    writeln!(w, "valid_before: {}", timestamp(cert.valid_before()))?;
    writeln!(w, "extensions:")?;
    for (name, value) in cert.extensions().iter() {
        if value.is_empty() {
            writeln!(w, "  {name}")?;
        } else {
            writeln!(w, "  {name}: {value}")?;
        }
    }
    w.flush()
}
