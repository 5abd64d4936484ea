use http::StatusCode;
use may_minihttp::Response;

/// Write `status` with an empty body.
pub fn write_status(res: &mut Response, status: StatusCode) {
    res.status_code(
        status.as_u16() as usize,
        status.canonical_reason().unwrap_or("OK"),
    );
}
