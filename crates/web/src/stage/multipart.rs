//! `multipart/form-data` parsing over a fully buffered body.

use bytes::Bytes;
use httparse::Status;

use crate::error::EdgeError;
use crate::request::{FilePart, MultipartForm};

const MAX_PART_HEADERS: usize = 16;

pub(crate) fn parse(body: &Bytes, boundary: &str) -> Result<MultipartForm, EdgeError> {
    if boundary.is_empty() || boundary.len() > 70 {
        return Err(EdgeError::bad_request("invalid multipart boundary"));
    }

    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();
    // between parts the delimiter follows the CRLF that ends the previous part
    let separator = [b"\r\n".as_slice(), delimiter].concat();

    let mut pos = find(body, delimiter, 0).ok_or_else(|| EdgeError::bad_request("missing opening multipart delimiter"))?
        + delimiter.len();
    let mut form = MultipartForm::default();

    loop {
        let rest = &body[pos..];
        if rest.starts_with(b"--") {
            return Ok(form);
        }
        if !rest.starts_with(b"\r\n") {
            return Err(EdgeError::bad_request("malformed multipart delimiter line"));
        }
        pos += 2;

        let mut headers = [httparse::EMPTY_HEADER; MAX_PART_HEADERS];
        let (header_len, part_headers) = match httparse::parse_headers(&body[pos..], &mut headers) {
            Ok(Status::Complete((len, part_headers))) => (len, part_headers),
            Ok(Status::Partial) => return Err(EdgeError::bad_request("multipart part without header terminator")),
            Err(e) => return Err(EdgeError::bad_request(format!("invalid multipart part header: {e}"))),
        };

        let mut disposition = None;
        let mut content_type = None;
        for header in part_headers.iter() {
            let value = std::str::from_utf8(header.value)
                .map_err(|_| EdgeError::bad_request("non utf-8 multipart header"))?;
            if header.name.eq_ignore_ascii_case("content-disposition") {
                disposition = Some(parse_disposition(value)?);
            } else if header.name.eq_ignore_ascii_case("content-type") {
                content_type = Some(value.trim().to_string());
            }
        }
        let Some((name, file_name)) = disposition else {
            return Err(EdgeError::bad_request("multipart part without content-disposition"));
        };

        let data_start = pos + header_len;
        let data_end = find(body, &separator, data_start)
            .ok_or_else(|| EdgeError::bad_request("missing closing multipart delimiter"))?;
        let data = body.slice(data_start..data_end);

        match file_name {
            Some(file_name) => form.files.push(FilePart { field_name: name, file_name, content_type, data }),
            None => {
                let value = String::from_utf8(data.to_vec())
                    .map_err(|_| EdgeError::bad_request("non utf-8 multipart field value"))?;
                form.fields.push((name, value));
            }
        }

        pos = data_end + separator.len();
    }
}

/// Returns the `name` and optional `filename` of a `form-data` disposition.
fn parse_disposition(value: &str) -> Result<(String, Option<String>), EdgeError> {
    let mut params = value.split(';').map(str::trim);
    if !params.next().is_some_and(|kind| kind.eq_ignore_ascii_case("form-data")) {
        return Err(EdgeError::bad_request("multipart part is not form-data"));
    }

    let mut name = None;
    let mut file_name = None;
    for param in params {
        let Some((key, raw)) = param.split_once('=') else {
            continue;
        };
        let unquoted = raw.trim().trim_matches('"').to_string();
        match key.trim().to_ascii_lowercase().as_str() {
            "name" => name = Some(unquoted),
            "filename" => file_name = Some(unquoted),
            _ => {}
        }
    }

    let name = name.ok_or_else(|| EdgeError::bad_request("multipart part without a name"))?;
    Ok((name, file_name))
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..].windows(needle.len()).position(|window| window == needle).map(|offset| from + offset)
}
