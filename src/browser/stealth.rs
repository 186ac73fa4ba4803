//! Evasion scripts installed before any page script runs.
//!
//! Storefront bot shields mostly look at the automation flag, the plugin
//! list and the WebGL vendor string; these patches cover those.

pub const STEALTH_SCRIPTS: &[&str] = &[
    // Automation flag
    r#"
    Object.defineProperty(navigator, 'webdriver', { get: () => undefined, configurable: true });
    "#,
    // Chrome runtime object present on desktop Chrome
    r#"
    if (!window.chrome) {
        window.chrome = { runtime: {}, loadTimes: function() {}, csi: function() {}, app: {} };
    }
    "#,
    // Non-empty plugin list and locale-appropriate languages
    r#"
    Object.defineProperty(navigator, 'plugins', {
        get: () => [
            { name: 'Chrome PDF Plugin', filename: 'internal-pdf-viewer', description: 'Portable Document Format' },
            { name: 'Chrome PDF Viewer', filename: 'mhjfbmdgcfjbbpaeojofohoefgiehjai', description: '' }
        ],
        configurable: true
    });
    Object.defineProperty(navigator, 'languages', { get: () => ['he-IL', 'he', 'en-US', 'en'], configurable: true });
    "#,
    // WebGL vendor/renderer
    r#"
    if (window.WebGLRenderingContext) {
        const getParameter = WebGLRenderingContext.prototype.getParameter;
        WebGLRenderingContext.prototype.getParameter = function(parameter) {
            if (parameter === 37445) return 'Intel Inc.';
            if (parameter === 37446) return 'Intel Iris OpenGL Engine';
            return getParameter.call(this, parameter);
        };
    }
    "#,
];
