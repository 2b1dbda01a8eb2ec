//! In-page request instrumentation.
//!
//! The proxy injects [`TRACKING_SCRIPT`] ahead of the first `<head` tag of
//! every HTML response. It keeps a count of in-flight `XMLHttpRequest` and
//! `fetch` calls on [`PENDING_REQUESTS_GLOBAL`], which the synchronizer reads
//! with [`PENDING_REQUESTS_SCRIPT`].

/// Page-global counter of outstanding asynchronous requests
pub const PENDING_REQUESTS_GLOBAL: &str = "__PDIFF_PENDING_REQUESTS";

/// Script body returning the current counter value
pub const PENDING_REQUESTS_SCRIPT: &str = "return window.__PDIFF_PENDING_REQUESTS;";

/// `<script>` element injected into proxied HTML
pub const TRACKING_SCRIPT: &str = r#"<script>
(function () {
  if (window.__PDIFF_PENDING_REQUESTS !== undefined) { return; }
  window.__PDIFF_PENDING_REQUESTS = 0;
  var READY_STATE_DONE = 4;
  var xhrSend = XMLHttpRequest.prototype.send;
  XMLHttpRequest.prototype.send = function () {
    window.__PDIFF_PENDING_REQUESTS++;
    this.addEventListener('readystatechange', function () {
      if (this.readyState === READY_STATE_DONE) {
        window.__PDIFF_PENDING_REQUESTS--;
      }
    }.bind(this), false);
    return xhrSend.apply(this, arguments);
  };
  if (typeof window.fetch === 'function') {
    var nativeFetch = window.fetch;
    window.fetch = function () {
      window.__PDIFF_PENDING_REQUESTS++;
      var done = function () { window.__PDIFF_PENDING_REQUESTS--; };
      var pending = nativeFetch.apply(this, arguments);
      pending.then(done, done);
      return pending;
    };
  }
})();
</script>
"#;

/// Script body that hides every element matching `selector`.
///
/// The selector is embedded as a JSON string literal so quotes inside it
/// cannot break out of the script.
#[must_use]
pub fn hide_script(selector: &str) -> String {
    let literal = serde_json::Value::from(selector).to_string();
    format!(
        "var els = document.querySelectorAll({literal});\n\
         for (var i = 0; i < els.length; i++) {{ els[i].hidden = true; }}"
    )
}
