use crate::param::*;

use bytes::{BufMut, BytesMut};
use log::debug;

use std::io::{self, Write};

/// 延迟输出缓冲区。
///
/// 响应头与响应体分开累积，直到 [`Response::flush`] 时才按"头、空行、体"的顺序一次性写出，
/// 因此脚本在输出正文之后仍然可以修改响应头（包括会话 Cookie）。
#[derive(Debug, Clone)]
pub struct Response {
    headers: Vec<String>,
    body: BytesMut,
}

impl Response {
    pub fn new() -> Self {
        Self {
            headers: vec![DEFAULT_CONTENT_TYPE.to_string()],
            body: BytesMut::new(),
        }
    }

    /// 追加一行响应头。
    ///
    /// 头名称（不区分大小写）为 `Location` 时，之前的所有头都会被丢弃，
    /// 换成 302 重定向前导头再加上这一行。
    pub fn append_header(&mut self, line: &str) -> &mut Self {
        if is_location(line) {
            debug!("设置Location头，响应头重置为302重定向");
            self.headers.clear();
            self.headers.push(REDIRECT_STATUS_LINE.to_string());
            self.headers.push(REDIRECT_STATUS_HEADER.to_string());
        }
        self.headers.push(line.to_string());
        self
    }

    pub fn append_body(&mut self, text: &str) -> &mut Self {
        self.body.put_slice(text.as_bytes());
        self
    }

    /// 把响应头、空行分隔符、响应体依次写入目标。
    ///
    /// 该方法消耗 `self`，一个缓冲区只可能被写出一次。
    pub fn flush<W: Write>(self, out: &mut W) -> io::Result<()> {
        debug!(
            "写出响应：{}行响应头，响应体{}字节",
            self.headers.len(),
            self.body.len()
        );
        out.write_all(self.header_block().as_bytes())?;
        out.write_all(HEADER_SEPARATOR.as_bytes())?;
        out.write_all(&self.body)?;
        out.flush()
    }

    /// 将响应头拼接为一个整体。自带换行的行（如重定向前导头）不再额外加换行。
    fn header_block(&self) -> String {
        let mut block = String::new();
        for (index, line) in self.headers.iter().enumerate() {
            block.push_str(line);
            if index < self.headers.len() - 1 && !line.ends_with('\n') {
                block.push('\n');
            }
        }
        block
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

/// 只有以 `location:` 开头（不区分大小写）的行才算重定向
fn is_location(line: &str) -> bool {
    line.get(..LOCATION_PREFIX.len())
        .map_or(false, |prefix| prefix.eq_ignore_ascii_case(LOCATION_PREFIX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn flushed(response: Response) -> String {
        let mut out = Vec::new();
        response.flush(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_response_new() {
        let response = Response::new();
        assert_eq!(response.headers(), &["Content-type: text/html".to_string()]);
        assert!(response.body().is_empty());
    }

    #[test]
    fn test_flush_default() {
        let mut response = Response::new();
        response.append_body("Hello");
        assert_eq!(flushed(response), "Content-type: text/html\r\n\r\nHello");
    }

    #[test]
    fn test_flush_joins_headers_with_newlines() {
        let mut response = Response::new();
        response
            .append_header("Set-Cookie: DUKSID=abc;")
            .append_header("X-Frame-Options: DENY")
            .append_body("<p>ok</p>");
        assert_eq!(
            flushed(response),
            "Content-type: text/html\nSet-Cookie: DUKSID=abc;\nX-Frame-Options: DENY\r\n\r\n<p>ok</p>"
        );
    }

    #[test]
    fn test_header_after_body_still_precedes_body() {
        let mut response = Response::new();
        response.append_body("first");
        response.append_header("X-Late: yes");
        let output = flushed(response);
        let header_pos = output.find("X-Late: yes").unwrap();
        let body_pos = output.find("first").unwrap();
        assert!(header_pos < body_pos);
    }

    #[test]
    fn test_location_resets_headers() {
        let mut response = Response::new();
        response
            .append_header("X-One: 1")
            .append_header("X-Two: 2")
            .append_header("Location: /x");
        assert_eq!(
            response.headers(),
            &[
                "HTTP/1.0 302 Ok\r\n".to_string(),
                "Status: 302 Moved\r\n".to_string(),
                "Location: /x".to_string(),
            ]
        );
    }

    #[test]
    fn test_location_flush_format() {
        let mut response = Response::new();
        response.append_header("location: /login");
        assert_eq!(
            flushed(response),
            "HTTP/1.0 302 Ok\r\nStatus: 302 Moved\r\nlocation: /login\r\n\r\n"
        );
    }

    #[test]
    fn test_padded_location_is_plain_header() {
        let mut response = Response::new();
        response.append_header("Location : /x");
        assert_eq!(
            response.headers(),
            &[
                "Content-type: text/html".to_string(),
                "Location : /x".to_string(),
            ]
        );
    }

    #[test]
    fn test_headers_after_location_are_appended() {
        let mut response = Response::new();
        response
            .append_header("Location: /x")
            .append_header("Set-Cookie: a=b");
        assert_eq!(response.headers().len(), 4);
        assert_eq!(response.headers()[3], "Set-Cookie: a=b");
    }

    #[test]
    fn test_is_location() {
        assert!(is_location("Location: /x"));
        assert!(is_location("LOCATION:/x"));
        assert!(!is_location("Content-Location: /x"));
        assert!(!is_location("X-Location-Hint: /x"));
        assert!(!is_location("Location"));
        assert!(!is_location(" Location: /x"));
        assert!(!is_location("Location : /x"));
    }

    proptest! {
        #[test]
        fn prop_location_always_resets(prior in proptest::collection::vec("[A-Za-z-]{1,12}: [a-z0-9]{0,8}", 0..8)) {
            let mut response = Response::new();
            for line in &prior {
                response.append_header(line);
            }
            response.append_header("Location: /x");
            prop_assert_eq!(
                response.headers().to_vec(),
                vec![
                    "HTTP/1.0 302 Ok\r\n".to_string(),
                    "Status: 302 Moved\r\n".to_string(),
                    "Location: /x".to_string(),
                ]
            );
        }

        #[test]
        fn prop_body_is_concatenation(parts in proptest::collection::vec(".{0,16}", 0..8)) {
            let mut response = Response::new();
            for part in &parts {
                response.append_body(part);
            }
            let expected = parts.concat();
            prop_assert_eq!(response.body(), expected.as_bytes());
        }
    }
}
