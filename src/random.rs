//! 安全随机数生成模块
//!
//! 随机源通过 [`RandomSource`] trait 注入到需要它的组件（Refresh Token 的
//! nonce、密码哈希的 salt），而不是使用进程级的全局 RNG。测试中可以注入
//! 确定性的 [`SeededRandomSource`] 或者一个总是失败的实现。

use std::fmt;
use std::sync::Mutex;

use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng, TryRngCore};
use subtle::ConstantTimeEq;

use crate::error::{CryptoError, Error, Result};

/// 随机字节来源
pub trait RandomSource: Send + Sync + fmt::Debug {
    /// 用随机字节填满 `dest`
    fn fill_bytes(&self, dest: &mut [u8]) -> Result<()>;
}

/// 操作系统提供的密码学安全随机源 (CSPRNG)
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRandomSource;

impl RandomSource for OsRandomSource {
    fn fill_bytes(&self, dest: &mut [u8]) -> Result<()> {
        OsRng
            .try_fill_bytes(dest)
            .map_err(|e| Error::Crypto(CryptoError::RngFailed(format!("{:?}", e))))
    }
}

/// 确定性随机源
///
/// 相同的种子总是产生相同的字节序列，只应在测试中使用。
pub struct SeededRandomSource {
    rng: Mutex<StdRng>,
}

impl SeededRandomSource {
    /// 使用指定种子创建随机源
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl fmt::Debug for SeededRandomSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeededRandomSource").finish_non_exhaustive()
    }
}

impl RandomSource for SeededRandomSource {
    fn fill_bytes(&self, dest: &mut [u8]) -> Result<()> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| Error::Crypto(CryptoError::RngFailed("lock poisoned".into())))?;
        rng.fill_bytes(dest);
        Ok(())
    }
}

/// 生成指定长度的随机字节数组
///
/// # Example
///
/// ```rust
/// use commerce_auth::random::{OsRandomSource, generate_random_bytes};
///
/// let bytes = generate_random_bytes(&OsRandomSource, 32).unwrap();
/// assert_eq!(bytes.len(), 32);
/// ```
pub fn generate_random_bytes(source: &dyn RandomSource, length: usize) -> Result<Vec<u8>> {
    let mut bytes = vec![0u8; length];
    source.fill_bytes(&mut bytes)?;
    Ok(bytes)
}

/// 生成指定字节数的十六进制随机字符串（长度为字节数的两倍）
pub fn generate_random_hex(source: &dyn RandomSource, byte_length: usize) -> Result<String> {
    let bytes = generate_random_bytes(source, byte_length)?;
    Ok(hex::encode(bytes))
}

/// 生成 UUID 格式的随机 nonce
///
/// 使用 16 字节随机数据，按 UUID v4 的格式设置版本位和变体位。
///
/// # Example
///
/// ```rust
/// use commerce_auth::random::{SeededRandomSource, generate_nonce};
///
/// let a = generate_nonce(&SeededRandomSource::new(7)).unwrap();
/// let b = generate_nonce(&SeededRandomSource::new(7)).unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a.len(), 36);
/// ```
pub fn generate_nonce(source: &dyn RandomSource) -> Result<String> {
    let mut bytes = [0u8; 16];
    source.fill_bytes(&mut bytes)?;
    Ok(uuid::Builder::from_random_bytes(bytes)
        .into_uuid()
        .to_string())
}

/// 常量时间比较两个字节切片
///
/// 比较耗时只取决于长度，与第一个不同字节出现的位置无关。长度本身不是秘密，
/// 长度不同会直接返回 false。
///
/// # Example
///
/// ```rust
/// use commerce_auth::random::constant_time_compare;
///
/// assert!(constant_time_compare(b"secret_token", b"secret_token"));
/// assert!(!constant_time_compare(b"secret_token", b"other_token!"));
/// ```
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// 常量时间比较两个字符串
pub fn constant_time_compare_str(a: &str, b: &str) -> bool {
    constant_time_compare(a.as_bytes(), b.as_bytes())
}
