//! Filesystem and process handlers for each [`Action`] kind. Every handler
//! honors `dry_run` (skip the mutation, still log what would happen) and,
//! for actions that write a destination, `force` (remove an existing
//! destination first instead of failing).

use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};

use tracing::{debug, info};

use crate::action::Action;
use crate::context::Context;
use crate::error::{ReplayError, Result};
use crate::task::TaskId;

/// Dispatches on action kind; `task_id` is threaded through to handlers
/// whose output the serializer must order — currently only `echo`.
pub fn execute_for_task(action: &Action, task_id: TaskId, ctx: &Context) -> Result<()> {
    match action {
        Action::Clone { from, to, force, permissions } => clone(from, to, *force, *permissions, ctx),
        Action::Move { from, to, force, permissions } => mv(from, to, *force, *permissions, ctx),
        Action::Hardlink { from, to, force } => hardlink(from, to, *force, ctx),
        Action::Symlink { from, to, force } => symlink(from, to, *force, ctx),
        Action::Create { to, content, permissions } => create(to, content, *permissions, ctx),
        Action::CreateDirectory { to } => create_directory(to, ctx),
        Action::Delete { item, recursive } => delete(item, *recursive, ctx),
        Action::Execute { tool, arguments, stdin, stdout, env } => {
            run_tool(tool, arguments, stdin.as_deref(), stdout.as_deref(), env, task_id, ctx)
        }
        Action::Echo { content } => echo(content, task_id, ctx),
    }
}

fn ensure_clear_destination(to: &Path, force: bool) -> Result<()> {
    if !to.exists() {
        return Ok(());
    }
    if !force {
        return Err(ReplayError::Io(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("{} already exists (use force to overwrite)", to.display()),
        )));
    }
    if to.is_dir() && !to.is_symlink() {
        fs::remove_dir_all(to)?;
    } else {
        fs::remove_file(to)?;
    }
    Ok(())
}

fn ensure_parent_dir(to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn apply_permissions(path: &Path, permissions: Option<u32>) -> Result<()> {
    if let Some(mode) = permissions {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    }
    Ok(())
}

fn clone(from: &Path, to: &Path, force: bool, permissions: Option<u32>, ctx: &Context) -> Result<()> {
    debug!(from = %from.display(), to = %to.display(), "clone");
    if ctx.flags.dry_run {
        return Ok(());
    }
    ensure_parent_dir(to)?;
    ensure_clear_destination(to, force)?;
    if from.is_dir() {
        copy_tree(from, to)?;
    } else if reflink_copy::reflink(from, to).is_err() {
        fs::copy(from, to)?;
    }
    apply_permissions(to, permissions)
}

fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let src = entry.path();
        let dst = to.join(entry.file_name());
        if src.is_dir() {
            copy_tree(&src, &dst)?;
        } else if reflink_copy::reflink(&src, &dst).is_err() {
            fs::copy(&src, &dst)?;
        }
    }
    Ok(())
}

fn mv(from: &Path, to: &Path, force: bool, permissions: Option<u32>, ctx: &Context) -> Result<()> {
    debug!(from = %from.display(), to = %to.display(), "move");
    if ctx.flags.dry_run {
        return Ok(());
    }
    ensure_parent_dir(to)?;
    ensure_clear_destination(to, force)?;
    match fs::rename(from, to) {
        Ok(()) => {}
        // Cross-device rename (EXDEV): fall back to copy-then-remove.
        Err(e) if e.raw_os_error() == Some(libc::EXDEV) => {
            if from.is_dir() {
                copy_tree(from, to)?;
                fs::remove_dir_all(from)?;
            } else {
                fs::copy(from, to)?;
                fs::remove_file(from)?;
            }
        }
        Err(e) => return Err(e.into()),
    }
    apply_permissions(to, permissions)
}

fn hardlink(from: &Path, to: &Path, force: bool, ctx: &Context) -> Result<()> {
    debug!(from = %from.display(), to = %to.display(), "hardlink");
    if ctx.flags.dry_run {
        return Ok(());
    }
    ensure_parent_dir(to)?;
    ensure_clear_destination(to, force)?;
    fs::hard_link(from, to)?;
    Ok(())
}

fn symlink(from: &Path, to: &Path, force: bool, ctx: &Context) -> Result<()> {
    debug!(from = %from.display(), to = %to.display(), "symlink");
    if ctx.flags.dry_run {
        return Ok(());
    }
    ensure_parent_dir(to)?;
    ensure_clear_destination(to, force)?;
    std::os::unix::fs::symlink(from, to)?;
    Ok(())
}

fn create(to: &Path, content: &str, permissions: Option<u32>, ctx: &Context) -> Result<()> {
    debug!(to = %to.display(), bytes = content.len(), "create");
    if ctx.flags.dry_run {
        return Ok(());
    }
    ensure_parent_dir(to)?;
    fs::write(to, content)?;
    apply_permissions(to, permissions)
}

fn create_directory(to: &Path, ctx: &Context) -> Result<()> {
    debug!(to = %to.display(), "create-directory");
    if ctx.flags.dry_run {
        return Ok(());
    }
    fs::create_dir_all(to)?;
    Ok(())
}

fn delete(item: &Path, recursive: bool, ctx: &Context) -> Result<()> {
    debug!(item = %item.display(), recursive, "delete");
    if ctx.flags.dry_run {
        return Ok(());
    }
    if !item.exists() && !item.is_symlink() {
        return Ok(());
    }
    if item.is_dir() && !item.is_symlink() {
        if recursive {
            fs::remove_dir_all(item)?;
        } else {
            fs::remove_dir(item)?;
        }
    } else {
        fs::remove_file(item)?;
    }
    Ok(())
}

/// Runs the child process and, unless its stdout is redirected to a file,
/// captures stdout/stderr and routes them through `ctx.serializer` instead
/// of inheriting the parent's streams — two `execute` tasks running
/// concurrently would otherwise interleave their output on the shared
/// terminal, which is exactly what the serializer exists to prevent (see
/// `echo`, which goes through the same entry point).
fn run_tool(
    tool: &Path,
    arguments: &[String],
    stdin: Option<&Path>,
    stdout: Option<&Path>,
    env: &std::collections::HashMap<String, String>,
    task_id: TaskId,
    ctx: &Context,
) -> Result<()> {
    info!(tool = %tool.display(), args = ?arguments, "execute");
    if ctx.flags.dry_run {
        return Ok(());
    }

    let mut cmd = Command::new(tool);
    cmd.args(arguments);
    for (k, v) in env {
        cmd.env(k, v);
    }

    cmd.stdin(match stdin {
        Some(path) => Stdio::from(fs::File::open(path)?),
        None => Stdio::null(),
    });

    // A file redirect writes directly to its own destination, so there's
    // no shared terminal to interleave on; only the terminal-bound case
    // needs to go through the serializer.
    let redirect_to_file = stdout.is_some();
    cmd.stdout(match stdout {
        Some(path) => Stdio::from(fs::File::create(path)?),
        None => Stdio::piped(),
    });
    cmd.stderr(Stdio::piped());

    let output = cmd.output()?;

    if !redirect_to_file {
        let captured_stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        ctx.serializer.submit_stdout(task_id, trim_trailing_newline(captured_stdout));
    }
    let captured_stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    ctx.serializer.submit_stderr(task_id, trim_trailing_newline(captured_stderr));

    if !output.status.success() {
        return Err(ReplayError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("{} exited with {}", tool.display(), output.status),
        )));
    }
    Ok(())
}

fn trim_trailing_newline(mut text: String) -> String {
    if text.ends_with('\n') {
        text.pop();
        if text.ends_with('\r') {
            text.pop();
        }
    }
    text
}

fn echo(content: &str, task_id: TaskId, ctx: &Context) -> Result<()> {
    if ctx.flags.verbose {
        info!(%content, "echo");
    }
    ctx.serializer.submit(task_id, content.to_string());
    Ok(())
}
