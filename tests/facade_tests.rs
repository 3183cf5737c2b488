//! Facade re-export tests

use async_trait::async_trait;
use rstest::*;
use trellis::prelude::*;

struct Banner;

#[async_trait(?Send)]
impl Component for Banner {
	async fn template(&self, _instance: &Instance) -> HookResult<Option<String>> {
		Ok(Some("<strong>ready</strong>".to_string()))
	}
}

#[rstest]
#[tokio::test]
async fn test_prelude_drives_a_runtime() {
	let runtime = Runtime::builder()
		.body(r#"<header data-banner></header><main data-view></main>"#)
		.build()
		.unwrap();
	runtime.component("[data-banner]", Banner).unwrap();
	runtime
		.router()
		.add(RouteDefinition::new("home", "/").unwrap().with_markup("<h1>Home</h1>"));

	runtime.start().await.unwrap();

	assert_eq!(runtime.router().active().map(|route| route.id().to_string()), Some("home".to_string()));
	let body = runtime.body();
	let markup = runtime.document().inner_html(body);
	assert!(markup.contains("<strong>ready</strong>"));
	assert!(markup.contains("<h1>Home</h1>"));
}

#[rstest]
fn test_settings_defaults_are_exposed() {
	let settings = RuntimeSettings::default();
	assert_eq!(settings.mode, HistoryMode::History);
	assert!(settings.validate().is_ok());
}
