//! HTML pages of the portal.
//!
//! Every page is written into a [`BoundedWriter`]; running out of room is an
//! error for the caller to turn into a 500.

use devcfg_core::{escape_html, BoundedWriter, Entry, EntryType, Namespace, Registry, WriteError};
use tracing::warn;

type PageResult = Result<(), WriteError>;

/// Query parameter asking `/` to reboot the device.
pub const REBOOT_PARAM: &str = "reboot";
/// Query parameter naming the namespace on `/setup` and `/get`.
pub const NAMESPACE_PARAM: &str = "namespace";
/// Query parameter naming the entry on `/get`.
pub const ENTRY_PARAM: &str = "entry";
/// Query parameter asking `/setup` to restore a namespace's defaults.
pub const RESET_DEFAULTS_PARAM: &str = "reset_defaults";
/// Query parameters of the factory reset form.
pub const FACTORY_RESET_PARAM: &str = "factory_reset";
pub const CONFIRM_PARAM: &str = "confirm";

/// Stylesheet served at `/style.min.css`.
pub const STYLE_CSS: &str = concat!(
    "body{font-family:sans-serif;color:#606c76;max-width:40rem;margin:0 auto;padding:1rem}",
    "h1{font-size:1.6rem}",
    "a{color:#9b4dca;text-decoration:none}",
    "ul{padding-left:1.2rem}li{margin:.4rem 0}",
    "div{margin:.8rem 0}",
    "input[type=text],input[type=number],input[type=password]{width:100%;padding:.5rem;",
    "border:.1rem solid #d1d1d1;border-radius:.4rem;box-sizing:border-box}",
    "input[readonly]{background:#f4f5f6}",
    ".button,input[type=submit]{display:inline-block;background:#9b4dca;color:#fff;",
    "border:.1rem solid #9b4dca;border-radius:.4rem;padding:0 2rem;line-height:3.6rem;",
    "font-size:1.1rem;cursor:pointer;margin:.4rem .4rem .4rem 0}",
    ".button-outline{background:transparent;color:#9b4dca}",
    ".button-clear{background:transparent;border-color:transparent;color:#9b4dca}",
    "table{width:100%;border-collapse:collapse}td,th{text-align:left;padding:.3rem;",
    "border-bottom:.1rem solid #e1e1e1}",
);

fn head(out: &mut BoundedWriter, title: &str) -> PageResult {
    out.push_fmt(format_args!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\" /><title>{}</title>\
         <link rel=\"stylesheet\" href=\"/style.min.css\" />\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\" /></head><body>",
        escape_html(title)
    ))
}

fn tail(out: &mut BoundedWriter) -> PageResult {
    out.push_str("</body></html>")
}

/// Landing page.
pub fn root_page(out: &mut BoundedWriter, title: &str) -> PageResult {
    head(out, title)?;
    out.push_fmt(format_args!(
        "<h1>{}</h1><p><a class=\"button\" href=\"/setup\">Setup</a></p>",
        escape_html(title)
    ))?;
    tail(out)
}

/// Shown while the device restarts.
pub fn reboot_page(out: &mut BoundedWriter, title: &str) -> PageResult {
    head(out, title)?;
    out.push_str(
        "<p>Rebooting device. Wait 10 seconds before clicking <a href=\"/setup\">back</a> \
         (the link might not work if network settings were changed).</p>",
    )?;
    tail(out)
}

/// List of registered namespaces.
pub fn setup_page(out: &mut BoundedWriter, title: &str, registry: &Registry) -> PageResult {
    head(out, title)?;
    out.push_fmt(format_args!("<h1>{}</h1><ul>", escape_html(title)))?;
    for (_, namespace) in registry.namespaces() {
        out.push_fmt(format_args!(
            "<li><a href=\"/setup?{NAMESPACE_PARAM}={}\">{}</a></li>",
            escape_html(namespace.key()),
            escape_html(namespace.friendly())
        ))?;
    }
    out.push_fmt(format_args!(
        "</ul><a class=\"button button-clear\" href=\"/?{REBOOT_PARAM}=1\">Reboot device</a>\
         <a class=\"button button-clear\" href=\"/factory\">Factory reset</a>"
    ))?;
    tail(out)
}

/// Form editing every entry of `namespace`.
pub fn namespace_page(out: &mut BoundedWriter, title: &str, namespace: &Namespace) -> PageResult {
    let key = escape_html(namespace.key());
    head(out, title)?;
    out.push_fmt(format_args!(
        "<h1>{}</h1><form method=\"get\" action=\"/setup\">\
         <input name=\"{NAMESPACE_PARAM}\" type=\"hidden\" value=\"{key}\" />",
        escape_html(namespace.friendly())
    ))?;
    for entry in namespace.entries() {
        match entry.render_widget(out) {
            Some(rendered) => rendered?,
            None => default_widget(out, entry)?,
        }
    }
    out.push_fmt(format_args!(
        "<input type=\"submit\" value=\"Save\" /></form>\
         <a class=\"button button-outline\" href=\"/setup\">Back</a>\
         <a class=\"button button-clear\" href=\"/setup?{NAMESPACE_PARAM}={key}&amp;{RESET_DEFAULTS_PARAM}=1\">Restore defaults</a>"
    ))?;
    tail(out)
}

/// Asks for confirmation before wiping every namespace.
pub fn factory_page(out: &mut BoundedWriter, title: &str) -> PageResult {
    head(out, title)?;
    out.push_fmt(format_args!(
        "<h1>Factory reset</h1><form method=\"get\" action=\"/factory\">\
         <input name=\"{FACTORY_RESET_PARAM}\" type=\"hidden\" value=\"1\" />\
         <div><label><input name=\"{CONFIRM_PARAM}\" type=\"checkbox\" value=\"1\" /> \
         Erase all settings and restart</label></div>\
         <input type=\"submit\" value=\"Reset\" /></form>\
         <a class=\"button button-outline\" href=\"/setup\">Back</a>"
    ))?;
    tail(out)
}

/// Shown after a factory reset, while the device restarts.
pub fn factory_done_page(out: &mut BoundedWriter, title: &str) -> PageResult {
    head(out, title)?;
    out.push_str(
        "<p>All settings were restored to their defaults. Rebooting device.</p>",
    )?;
    tail(out)
}

/// Form field for an entry without a widget of its own.
///
/// The current value is only shown for readable entries. Entries that are not
/// writable get a read-only field.
pub fn default_widget(out: &mut BoundedWriter, entry: &Entry) -> PageResult {
    let input_type = match entry.entry_type() {
        t if t.is_numeric() => "number",
        EntryType::Text => "text",
        EntryType::Password => "password",
        other => {
            warn!("No form widget for {} ({:?})", entry.key(), other);
            return out.push_fmt(format_args!(
                "<div>{}<br/><em>Not editable here</em></div>",
                escape_html(entry.friendly())
            ));
        }
    };

    let value = if entry.is_readable() {
        entry.serialize().unwrap_or_else(|e| {
            warn!("Cannot show value of {}: {}", entry.key(), e);
            String::new()
        })
    } else {
        String::new()
    };
    let step = match entry.entry_type() {
        EntryType::Float | EntryType::Double => " step=\"any\"",
        _ => "",
    };
    let readonly = if entry.is_writable() { "" } else { " readonly" };
    let key = escape_html(entry.key());

    out.push_fmt(format_args!(
        "<div>{}<br/><input type=\"{input_type}\" id=\"{key}\" name=\"{key}\" value=\"{}\"{step}{readonly} /></div>",
        escape_html(entry.friendly()),
        escape_html(&value)
    ))
}
