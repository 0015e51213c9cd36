//! HTTP/1.1 request parsing on top of `httparse`.

use crate::error::{Error, Result};
use crate::http::{HttpMethod, HttpRequest};

/// Maximum number of request headers. More is a malformed request.
pub const MAX_HEADERS: usize = 64;

/// Result of feeding the bytes read so far.
#[derive(Debug)]
pub enum Parsed {
    /// A full request with its body
    Complete(HttpRequest),
    /// More bytes needed. `total_len` is known once the header block is in,
    /// and covers headers plus the declared body.
    Incomplete { total_len: Option<usize> },
}

/// Parse one request from `buf`.
///
/// A header block longer than `max_header_size` is malformed, whether it is
/// complete or still arriving. Bodies are framed by `Content-Length` only;
/// chunked transfer encoding is refused. A declared body over
/// `max_body_size` fails before it is read.
pub fn parse_request(buf: &[u8], max_header_size: usize, max_body_size: usize) -> Result<Parsed> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);

    let header_len = match req.parse(buf) {
        Ok(httparse::Status::Complete(len)) => len,
        Ok(httparse::Status::Partial) if buf.len() > max_header_size => {
            return Err(header_block_too_large(max_header_size));
        }
        Ok(httparse::Status::Partial) => return Ok(Parsed::Incomplete { total_len: None }),
        Err(e) => return Err(Error::MalformedRequest(e.to_string())),
    };
    if header_len > max_header_size {
        return Err(header_block_too_large(max_header_size));
    }

    let method_str = req
        .method
        .ok_or_else(|| Error::MalformedRequest("missing method".into()))?;
    let method = HttpMethod::from_str(method_str)
        .ok_or_else(|| Error::MalformedRequest(format!("unsupported method {}", method_str)))?;
    let target = req
        .path
        .ok_or_else(|| Error::MalformedRequest("missing request target".into()))?;
    if !target.starts_with('/') {
        return Err(Error::MalformedRequest(format!("unsupported request target {}", target)));
    }

    let mut request = HttpRequest::new(method, target);
    let mut content_length: Option<usize> = None;

    for header in req.headers.iter() {
        let value = std::str::from_utf8(header.value)
            .map_err(|_| Error::MalformedRequest(format!("non UTF-8 value for {}", header.name)))?
            .trim();

        if header.name.eq_ignore_ascii_case("content-length") {
            let len: usize = value
                .parse()
                .map_err(|_| Error::MalformedRequest(format!("invalid Content-Length {:?}", value)))?;
            if content_length.is_some_and(|existing| existing != len) {
                return Err(Error::MalformedRequest("conflicting Content-Length headers".into()));
            }
            content_length = Some(len);
        } else if header.name.eq_ignore_ascii_case("transfer-encoding")
            && !value.eq_ignore_ascii_case("identity")
        {
            return Err(Error::BadRequest(format!(
                "Transfer-Encoding {} is not supported",
                value
            )));
        }

        request.headers.push(header.name, value);
    }

    let body_len = content_length.unwrap_or(0);
    if body_len > max_body_size {
        return Err(Error::PayloadTooLarge {
            size: body_len,
            limit: max_body_size,
        });
    }

    let total_len = header_len + body_len;
    if buf.len() < total_len {
        return Ok(Parsed::Incomplete {
            total_len: Some(total_len),
        });
    }

    request.body = buf[header_len..total_len].to_vec();
    Ok(Parsed::Complete(request))
}

fn header_block_too_large(limit: usize) -> Error {
    Error::MalformedRequest(format!("header block exceeds {} bytes", limit))
}
