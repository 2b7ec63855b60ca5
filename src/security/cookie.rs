//! Token Cookie 模块
//!
//! 两种 Token 通过 Cookie 传输：
//!
//! - **access_token**: Access Token（JWT）
//! - **refresh_token**: Refresh Token
//!
//! 两者都带 `HttpOnly`、`Secure`、`Path=/` 以及等于 Token 自身过期时间的
//! `Expires`。Token 值本身已经签名，这里不再对 Cookie 值做二次签名。
//!
//! ## 使用示例
//!
//! ```rust
//! use chrono::{Duration, Utc};
//! use commerce_auth::security::cookie::{CookieHeader, TokenCookies, TokenSource};
//!
//! let now = Utc::now();
//! let cookies = TokenCookies::new(
//!     "access.jwt.value",
//!     now + Duration::minutes(15),
//!     "refresh-value",
//!     now + Duration::days(7),
//! );
//!
//! let headers = cookies.to_header_values();
//! assert!(headers[0].starts_with("access_token=access.jwt.value"));
//!
//! // 下一次请求带回来的 Cookie 头
//! let jar = CookieHeader::parse("access_token=access.jwt.value; refresh_token=refresh-value");
//! assert_eq!(jar.refresh_token(), Some("refresh-value"));
//! ```

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Access Token 的 Cookie 名称
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// Refresh Token 的 Cookie 名称
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";

/// RFC 7231 的 HTTP 日期格式
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// SameSite Cookie 属性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SameSite {
    /// 严格模式：Cookie 只在同站请求时发送
    Strict,
    /// 宽松模式：允许顶级导航的跨站请求
    #[default]
    Lax,
    /// 无限制：所有请求都发送 Cookie（需要 Secure 属性）
    None,
}

impl std::fmt::Display for SameSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SameSite::Strict => write!(f, "Strict"),
            SameSite::Lax => write!(f, "Lax"),
            SameSite::None => write!(f, "None"),
        }
    }
}

/// 格式化为 RFC 7231 日期，例如 `Sun, 06 Nov 1994 08:49:37 GMT`
pub fn format_http_date(at: DateTime<Utc>) -> String {
    at.format(HTTP_DATE_FORMAT).to_string()
}

/// 安全 Cookie 结构
///
/// 封装 Cookie 的所有安全相关属性
#[derive(Debug, Clone)]
pub struct SecureCookie {
    /// Cookie 名称
    pub name: String,
    /// Cookie 值
    pub value: String,
    /// HttpOnly 属性（防止 JavaScript 访问）
    pub http_only: bool,
    /// Secure 属性（仅通过 HTTPS 发送）
    pub secure: bool,
    /// SameSite 属性
    pub same_site: SameSite,
    /// Max-Age 属性（秒）
    pub max_age: Option<Duration>,
    /// Expires 属性
    pub expires: Option<DateTime<Utc>>,
    /// Path 属性
    pub path: Option<String>,
    /// Domain 属性
    pub domain: Option<String>,
}

impl SecureCookie {
    /// 创建新的 Cookie
    ///
    /// # 示例
    ///
    /// ```rust
    /// use commerce_auth::security::cookie::SecureCookie;
    ///
    /// let cookie = SecureCookie::new("session", "abc123");
    /// assert_eq!(cookie.to_header_value(), "session=abc123; SameSite=Lax");
    /// ```
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            http_only: false,
            secure: false,
            same_site: SameSite::Lax,
            max_age: None,
            expires: None,
            path: None,
            domain: None,
        }
    }

    /// 创建 Token Cookie
    ///
    /// 设置 HttpOnly、Secure、Path=/ 以及 Expires
    pub fn token(
        name: impl Into<String>,
        value: impl Into<String>,
        expires: DateTime<Utc>,
    ) -> Self {
        Self::new(name, value)
            .http_only(true)
            .secure(true)
            .path("/")
            .expires(expires)
    }

    /// 设置 HttpOnly 属性
    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    /// 设置 Secure 属性
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// 设置 SameSite 属性
    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = same_site;
        self
    }

    /// 设置 Max-Age 属性
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// 设置 Expires 属性
    pub fn expires(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(expires);
        self
    }

    /// 设置 Path 属性
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// 设置 Domain 属性
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// 获取 Cookie 名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 获取 Cookie 值
    pub fn value(&self) -> &str {
        &self.value
    }

    /// 生成同名的删除 Cookie（空值、Max-Age=0、Expires 为 Unix 纪元）
    pub fn removal(&self) -> Self {
        let mut cookie = Self::new(self.name.clone(), "")
            .http_only(self.http_only)
            .secure(self.secure)
            .same_site(self.same_site)
            .max_age(Duration::ZERO)
            .expires(DateTime::<Utc>::UNIX_EPOCH);
        cookie.path = self.path.clone();
        cookie.domain = self.domain.clone();
        cookie
    }

    /// 生成 Set-Cookie 头值
    ///
    /// # 示例
    ///
    /// ```rust
    /// use commerce_auth::security::cookie::{SecureCookie, SameSite};
    /// use std::time::Duration;
    ///
    /// let cookie = SecureCookie::new("session", "abc123")
    ///     .http_only(true)
    ///     .secure(true)
    ///     .same_site(SameSite::Strict)
    ///     .max_age(Duration::from_secs(3600))
    ///     .path("/");
    ///
    /// let header = cookie.to_header_value();
    /// assert!(header.contains("session=abc123"));
    /// assert!(header.contains("HttpOnly"));
    /// assert!(header.contains("Secure"));
    /// ```
    pub fn to_header_value(&self) -> String {
        let mut parts = vec![format!("{}={}", self.name, self.value)];

        if self.http_only {
            parts.push("HttpOnly".to_string());
        }

        if self.secure {
            parts.push("Secure".to_string());
        }

        parts.push(format!("SameSite={}", self.same_site));

        if let Some(ref max_age) = self.max_age {
            parts.push(format!("Max-Age={}", max_age.as_secs()));
        }

        if let Some(expires) = self.expires {
            parts.push(format!("Expires={}", format_http_date(expires)));
        }

        if let Some(ref path) = self.path {
            parts.push(format!("Path={}", path));
        }

        if let Some(ref domain) = self.domain {
            parts.push(format!("Domain={}", domain));
        }

        parts.join("; ")
    }
}

/// 一次签发产生的两个 Token Cookie
#[derive(Debug, Clone)]
pub struct TokenCookies {
    /// Access Token Cookie
    pub access: SecureCookie,
    /// Refresh Token Cookie
    pub refresh: SecureCookie,
}

impl TokenCookies {
    /// 为一对 Token 创建 Cookie，`Expires` 分别等于各自 Token 的过期时间
    pub fn new(
        access_token: impl Into<String>,
        access_expires_at: DateTime<Utc>,
        refresh_token: impl Into<String>,
        refresh_expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access: SecureCookie::token(ACCESS_TOKEN_COOKIE, access_token, access_expires_at),
            refresh: SecureCookie::token(REFRESH_TOKEN_COOKIE, refresh_token, refresh_expires_at),
        }
    }

    /// 为两个 Cookie 设置 Domain，例如 `.shop.example.com` 让子域名共享登录态
    pub fn with_domain(self, domain: impl Into<String>) -> Self {
        let domain = domain.into();
        Self {
            access: self.access.domain(domain.clone()),
            refresh: self.refresh.domain(domain),
        }
    }

    /// 为两个 Cookie 设置 SameSite
    pub fn with_same_site(self, same_site: SameSite) -> Self {
        Self {
            access: self.access.same_site(same_site),
            refresh: self.refresh.same_site(same_site),
        }
    }

    /// 与当前 Cookie 同名、同 Domain 的删除 Cookie
    pub fn removal(&self) -> Self {
        Self {
            access: self.access.removal(),
            refresh: self.refresh.removal(),
        }
    }

    /// 登出时使用的删除 Cookie
    pub fn clear() -> Self {
        let template = Self::new("", DateTime::<Utc>::UNIX_EPOCH, "", DateTime::<Utc>::UNIX_EPOCH);
        Self {
            access: template.access.removal(),
            refresh: template.refresh.removal(),
        }
    }

    /// 两个 Set-Cookie 头值，access 在前
    pub fn to_header_values(&self) -> [String; 2] {
        [self.access.to_header_value(), self.refresh.to_header_value()]
    }
}

/// 请求中携带 Token 的来源
pub trait TokenSource {
    /// 读取指定名称的 Cookie 值
    fn cookie(&self, name: &str) -> Option<&str>;

    /// Refresh Token
    fn refresh_token(&self) -> Option<&str> {
        self.cookie(REFRESH_TOKEN_COOKIE).filter(|v| !v.is_empty())
    }

    /// Access Token
    fn access_token(&self) -> Option<&str> {
        self.cookie(ACCESS_TOKEN_COOKIE).filter(|v| !v.is_empty())
    }
}

/// 解析后的 `Cookie` 请求头
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieHeader {
    pairs: Vec<(String, String)>,
}

impl CookieHeader {
    /// 解析 `Cookie` 请求头（`name=value; name2=value2`）
    ///
    /// 没有 `=` 的片段被忽略；同名 Cookie 取第一个。
    pub fn parse(header: &str) -> Self {
        let pairs = header
            .split(';')
            .filter_map(|part| {
                let (name, value) = part.split_once('=')?;
                let name = name.trim();
                if name.is_empty() {
                    return None;
                }
                Some((name.to_string(), value.trim().trim_matches('"').to_string()))
            })
            .collect();
        Self { pairs }
    }

    /// Cookie 数量
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// 是否没有 Cookie
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl TokenSource for CookieHeader {
    fn cookie(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

impl TokenSource for HashMap<String, String> {
    fn cookie(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

impl<T: TokenSource + ?Sized> TokenSource for &T {
    fn cookie(&self, name: &str) -> Option<&str> {
        (**self).cookie(name)
    }
}
