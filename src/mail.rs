use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Utc};
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use log::info;

use crate::{env, error::ServiceResult};

pub async fn send_standard_mail(to: &str, subj: &str, message: String) -> ServiceResult<()> {
    let email = Message::builder()
        .to(Mailbox::new(None, Address::from_str(to)?))
        .from(Mailbox::new(
            Some(env::MAIL_SENDER_NAME.clone()),
            Address::from_str(env::MAIL_SENDER.as_str())?,
        ))
        .subject(subj)
        .header(ContentType::TEXT_PLAIN)
        .body(message)?;

    if env::MAIL_SERVER.as_str().ends_with(".local") {
        let bytes = email.formatted();
        info!("{}", String::from_utf8_lossy(&bytes));
    } else {
        let credentials = Credentials::new(env::MAIL_USER.clone(), env::MAIL_PASS.clone());

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&env::MAIL_SERVER)?
            .credentials(credentials)
            .build();

        mailer.send(email).await?;
    }

    Ok(())
}

/// Mails show times in WITA (UTC+8).
const MAIL_UTC_OFFSET: i32 = 8 * 60 * 60;

fn format_local(date: &DateTime<Utc>) -> String {
    match FixedOffset::east_opt(MAIL_UTC_OFFSET) {
        Some(timezone) => date.with_timezone(&timezone).format("%d.%m.%Y %H:%M").to_string(),
        None => date.format("%d.%m.%Y %H:%M UTC").to_string(),
    }
}

pub async fn send_otp_code(to: &str, code: &str, valid_until: &DateTime<Utc>) -> ServiceResult<()> {
    let mail_text = format!(
        "Hello,

your login code is: {code}

The code can be used once and expires at {date}.
If you did not request a code, you can ignore this mail.

----
This mail has been automatically generated. Please do not reply.",
        date = format_local(valid_until),
    );

    send_standard_mail(to, "Your login code", mail_text).await
}

pub async fn send_registration_mail(to: &str, venue_name: &str) -> ServiceResult<()> {
    let mail_text = format!(
        "Hello,

your venue \"{venue_name}\" has been registered. Connect your Midtrans merchant account
in the venue settings to start receiving tips.

{domain}/venue/onboarding

----
This mail has been automatically generated. Please do not reply.",
        domain = env::BASE_URL.as_str(),
    );

    send_standard_mail(to, "Welcome to cashless tipping", mail_text).await
}
