use structuremap::{plugs, ContextKey, Describe, Dispose, Pluggable, Registry, Resolver};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

// ===== Domain Types =====

#[derive(Debug, Clone)]
struct User {
    id: String,
    name: String,
}

#[derive(Debug)]
struct RequestContext {
    request_id: String,
    path: String,
}

// ===== Services =====

trait UserRepository: Send + Sync {
    fn find_by_id(&self, id: &str) -> Option<User>;
    fn find_all(&self) -> Vec<User>;
}

struct InMemoryUserRepository {
    users: HashMap<String, User>,
}

impl UserRepository for InMemoryUserRepository {
    fn find_by_id(&self, id: &str) -> Option<User> {
        self.users.get(id).cloned()
    }

    fn find_all(&self) -> Vec<User> {
        let mut users: Vec<User> = self.users.values().cloned().collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        users
    }
}

impl Pluggable for InMemoryUserRepository {
    fn describe(d: &mut Describe<Self>) {
        d.constructor(|_| {
            let users = [("1", "Alice"), ("2", "Bob"), ("3", "Charlie")]
                .into_iter()
                .map(|(id, name)| {
                    (
                        id.to_string(),
                        User {
                            id: id.to_string(),
                            name: name.to_string(),
                        },
                    )
                })
                .collect();
            Ok(InMemoryUserRepository { users })
        });
    }
}

plugs!(InMemoryUserRepository => dyn UserRepository);

/// Collects the lines logged while one request is handled, and prints them
/// when the request ends.
struct AuditTrail {
    lines: Mutex<Vec<String>>,
}

impl AuditTrail {
    fn record(&self, line: impl Into<String>) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.into());
        }
    }
}

impl Dispose for AuditTrail {
    fn dispose(&self) {
        if let Ok(lines) = self.lines.lock() {
            for line in lines.iter() {
                println!("    audit: {}", line);
            }
        }
    }
}

impl Pluggable for AuditTrail {
    fn describe(d: &mut Describe<Self>) {
        d.constructor(|_| {
            Ok(AuditTrail {
                lines: Mutex::new(Vec::new()),
            })
        });
        d.disposable();
    }
}

struct UserHandler {
    context: Arc<RequestContext>,
    repository: Arc<dyn UserRepository>,
    audit: Arc<AuditTrail>,
}

impl Pluggable for UserHandler {
    fn describe(d: &mut Describe<Self>) {
        d.constructor(|args| {
            Ok(UserHandler {
                context: args.get::<RequestContext>("context")?,
                repository: args.get::<dyn UserRepository>("repository")?,
                audit: args.get::<AuditTrail>("audit")?,
            })
        })
        .dependency::<RequestContext>("context")
        .dependency::<dyn UserRepository>("repository")
        .pluggable::<AuditTrail>("audit");
    }
}

impl UserHandler {
    fn handle(&self, query: &str) -> String {
        self.audit.record(format!("handling {}?{}", self.context.path, query));
        let response = match query.strip_prefix("id=") {
            Some(id) => match self.repository.find_by_id(id) {
                Some(user) => format!("User: {} ({})", user.name, user.id),
                None => "User not found".to_string(),
            },
            None => {
                let users: Vec<String> = self
                    .repository
                    .find_all()
                    .iter()
                    .map(|u| format!("{} ({})", u.name, u.id))
                    .collect();
                format!("All users: [{}]", users.join(", "))
            }
        };
        self.audit.record(format!("responded with {} bytes", response.len()));
        format!("Request ID: {}\nResponse: {}", self.context.request_id, response)
    }
}

// ===== Application =====

fn main() {
    println!("=== Request scope demo ===\n");

    let mut registry = Registry::new();
    registry
        .for_type::<dyn UserRepository>()
        .singleton()
        .use_type::<InMemoryUserRepository>();
    registry.for_type::<AuditTrail>().context_scoped().use_type::<AuditTrail>();
    let container = registry.build();

    let requests = ["/users?id=1", "/users?id=4", "/users", "/users?id=3"];
    let served = AtomicUsize::new(0);

    thread::scope(|s| {
        for (n, request) in requests.iter().copied().enumerate() {
            let container = &container;
            let served = &served;
            s.spawn(move || {
                let (path, query) = request.split_once('?').unwrap_or((request, ""));
                let key = ContextKey::from(n as u64 + 1);
                let context = Arc::new(RequestContext {
                    request_id: format!("req-{}", n + 1),
                    path: path.to_string(),
                });

                let scope = container
                    .with_context(key)
                    .get_nested_container_with(|r| {
                        r.for_type::<RequestContext>().use_value(context);
                    });

                match scope.get_concrete::<UserHandler>() {
                    Ok(handler) => println!("{}\n", handler.handle(query)),
                    Err(err) => eprintln!("request {} failed: {}", n + 1, err),
                }

                let report = container.end_context(key);
                println!("  {} finished, disposed {} value(s)", key, report.disposed);
                served.fetch_add(1, Ordering::SeqCst);
            });
        }
    });

    println!("\nServed {} requests", served.load(Ordering::SeqCst));
    println!("\n{}", container.model());

    let report = container.dispose();
    println!("Root disposed: {} value(s), clean: {}", report.disposed, report.is_clean());
}
