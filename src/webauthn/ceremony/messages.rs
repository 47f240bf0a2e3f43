//! Status texts shown by the demo page.

use std::fmt::Display;

pub const REGISTRATION_IN_PROGRESS: &str = "登録処理中...";
pub const REGISTRATION_SUCCEEDED: &str = "パスキーの登録に成功しました！";
pub const LOGIN_IN_PROGRESS: &str = "認証処理中...";
pub const LOGIN_SUCCEEDED: &str = "認証に成功しました！";

pub fn registration_failed(reason: impl Display) -> String {
    format!("登録に失敗しました: {reason}")
}

pub fn login_failed(reason: impl Display) -> String {
    format!("認証に失敗しました: {reason}")
}
