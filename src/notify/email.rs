//! Themed notification email rendered with minijinja and sent over SMTP.

// crates.io
use lettre::{
	AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
	message::{SinglePart, header::ContentType},
	transport::smtp::authentication::Credentials,
};
use minijinja::{Environment, context};
use serde::Serialize;
// self
use crate::{
	_prelude::*,
	config::Config,
	model::Test,
	notify::Notice,
	store::Store,
};

const TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<body style="font-family: Helvetica, Arial, sans-serif; background: #f5f5f5; padding: 24px;">
<div style="max-width: 640px; margin: auto; background: #ffffff; border-radius: 6px; padding: 24px;">
	<h2 style="margin-top: 0;">{{ title }}</h2>
	{% for intro in intros %}<p>{{ intro }}</p>{% endfor %}
	<p>
		<a href="{{ link }}" style="display: inline-block; padding: 10px 18px; border-radius: 4px; color: {{ button_text_color }}; background: {{ button_color }}; text-decoration: none;">View test</a>
	</p>
	<table style="width: 100%; border-collapse: collapse; font-size: 13px;">
		<tr>
			<th style="text-align: left; border-bottom: 1px solid #dddddd; padding: 6px;">Created at</th>
			<th style="text-align: left; border-bottom: 1px solid #dddddd; padding: 6px;">Status</th>
			<th style="text-align: left; border-bottom: 1px solid #dddddd; padding: 6px;">Error message</th>
			<th style="text-align: left; border-bottom: 1px solid #dddddd; padding: 6px;">Response time</th>
		</tr>
		{% for row in rows %}
		<tr>
			<td style="border-bottom: 1px solid #eeeeee; padding: 6px;">{{ row.created_at }}</td>
			<td style="border-bottom: 1px solid #eeeeee; padding: 6px;">{{ row.status }}</td>
			<td style="border-bottom: 1px solid #eeeeee; padding: 6px;">{{ row.message }}</td>
			<td style="border-bottom: 1px solid #eeeeee; padding: 6px;">{{ row.response_time }}</td>
		</tr>
		{% endfor %}
	</table>
	<p style="color: #888888;">Happy troubleshooting</p>
</div>
</body>
</html>
"#;

#[derive(Serialize)]
struct LogRowContext {
	created_at: String,
	status: &'static str,
	message: String,
	response_time: String,
}

/// Send a failure or recovery email for the test to `recipient`.
pub async fn send(
	config: &Config,
	store: &Store,
	recipient: &str,
	test: &Test,
	notice: Notice<'_>,
) -> Result<()> {
	let recipient = subaddressed(recipient, &test.test_name);
	let subject = match notice {
		Notice::Failure { .. } => format!("Error: {}", test.test_name),
		Notice::Recovery => format!("Successful: {}", test.test_name),
	};
	let body = render_body(config, store, test, notice).await?;
	let from = format!("Pingr <{}>", config.smtp_username)
		.parse()
		.map_err(|err| Error::Dispatch(format!("invalid sender address: {err}")))?;
	let to = recipient
		.parse()
		.map_err(|err| Error::Dispatch(format!("invalid recipient address '{recipient}': {err}")))?;
	let message = Message::builder().from(from).to(to).subject(subject).singlepart(
		SinglePart::builder().header(ContentType::TEXT_HTML).body(body),
	)?;
	let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
		.port(config.smtp_port)
		.credentials(Credentials::new(
			config.smtp_username.clone(),
			config.smtp_password.clone(),
		))
		.build();

	transport.send(message).await?;

	Ok(())
}

async fn render_body(
	config: &Config,
	store: &Store,
	test: &Test,
	notice: Notice<'_>,
) -> Result<String> {
	let logs = store.list_test_logs_limited(&test.test_id, 10).await?;
	let rows: Vec<LogRowContext> = logs
		.iter()
		.map(|log| LogRowContext {
			created_at: log.created_at.format("%Y-%m-%dT%H:%M:%S").to_string(),
			status: log.status.name(),
			message: log.message.clone(),
			response_time: format!("{}ms", log.response_time.as_millis()),
		})
		.collect();
	let link = format!("{}/tests/{}", config.base_url.trim_end_matches('/'), test.test_id);
	let mut environment = Environment::new();

	environment.add_template("email", TEMPLATE)?;

	let template = environment.get_template("email")?;
	let rendered = match notice {
		Notice::Failure { message, .. } => template.render(context! {
			title => "Error in one of your tests",
			intros => vec![
				format!("The test: {} is throwing an error", test.test_name),
				format!("Error message: {message}"),
			],
			link => link,
			button_color => "#f45b5b",
			button_text_color => "#ffffff",
			rows => rows,
		})?,
		Notice::Recovery => template.render(context! {
			title => "Test successful again",
			intros => vec![format!("The test: {} is up and running again", test.test_name)],
			link => link,
			button_color => "#90ed7d",
			button_text_color => "#000000",
			rows => rows,
		})?,
	};

	Ok(rendered)
}

// Rewrites `user@host` into `user+slug@host` so a mailbox can thread
// notifications per test.
fn subaddressed(address: &str, test_name: &str) -> String {
	match address.find('@') {
		Some(at) => format!("{}+{}{}", &address[..at], slugify(test_name), &address[at..]),
		None => address.to_string(),
	}
}

fn slugify(value: &str) -> String {
	let mut slug = String::with_capacity(value.len());

	for c in value.chars() {
		if c.is_ascii_alphanumeric() {
			slug.push(c.to_ascii_lowercase());
		} else if !slug.ends_with('-') && !slug.is_empty() {
			slug.push('-');
		}
	}

	slug.trim_end_matches('-').to_string()
}
