//! 客户端鉴权使用的MD5签名。

/// 将所有参数拼接后计算MD5，返回十六进制小写字符串。
pub fn sign_with_md5(args: &[&str]) -> String {
    let plain = args.concat();
    format!("{:x}", md5::compute(plain.as_bytes()))
}

/// 验证签名是否匹配。
pub fn verify_with_md5(sign: &str, args: &[&str]) -> bool {
    sign_with_md5(args) == sign
}

/// 计算任意文本的MD5十六进制摘要。
pub fn md5_hex(text: &str) -> String {
    format!("{:x}", md5::compute(text.as_bytes()))
}
