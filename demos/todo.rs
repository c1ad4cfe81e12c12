//! Demonstration of flowstore stores for a todo app

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use flowstore::{
    field, Action, ActionBindable, AnyState, AppState, AttachableState, ContainerState, Depender,
    Directory, MainContext, Settings, SharableState, State, Store, StoreMonitor,
};

#[derive(Clone, Debug, PartialEq)]
struct TodoItem {
    id: usize,
    title: String,
    completed: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
enum TodoFilter {
    #[default]
    All,
    Active,
    Completed,
}

#[derive(Clone, Debug, Default)]
struct Todos {
    items: Vec<TodoItem>,
    filter: TodoFilter,
}

#[derive(Debug)]
enum TodoAction {
    Add(String),
    Toggle(usize),
}

impl Action for TodoAction {}

#[derive(Debug)]
struct SetFilter(TodoFilter);

impl Action for SetFilter {}

impl Todos {
    fn filtered(&self) -> Vec<&TodoItem> {
        match self.filter {
            TodoFilter::All => self.items.iter().collect(),
            TodoFilter::Active => self.items.iter().filter(|t| !t.completed).collect(),
            TodoFilter::Completed => self.items.iter().filter(|t| t.completed).collect(),
        }
    }
}

impl State for Todos {
    fn load_reducers(store: &Store<Self>) {
        store.register_default(
            &[ReadOnlyMode::id()],
            |state, action: &TodoAction| match action {
                TodoAction::Add(title) => {
                    let id = state.items.len();
                    state.items.push(TodoItem {
                        id,
                        title: title.clone(),
                        completed: false,
                    });
                }
                TodoAction::Toggle(id) => {
                    if let Some(todo) = state.items.iter_mut().find(|t| t.id == *id) {
                        todo.completed = !todo.completed;
                    }
                }
            },
        );
        store.register(|state, action: &SetFilter| state.filter = action.0.clone());
    }
}

impl AttachableState for Todos {
    type Parent = AppState;
}

impl SharableState for Todos {}

impl ActionBindable for Todos {
    type BindAction = TodoAction;
}

/// Summary kept in its own store, fed by the todo store.
#[derive(Clone, Debug, Default, PartialEq)]
struct Stats {
    total: usize,
    active: usize,
    completed: usize,
}

impl State for Stats {}

#[derive(Debug)]
struct Recount(Stats);

impl Action for Recount {}

struct ReadOnlyMode {
    enabled: AtomicBool,
}

impl ReadOnlyMode {
    fn id() -> flowstore::DependerId {
        flowstore::DependerId::of::<ReadOnlyMode>()
    }
}

impl Depender for ReadOnlyMode {
    fn can_reduce(&self, _state: &dyn AnyState, action: &dyn Action) -> bool {
        let allowed = !self.enabled.load(Ordering::SeqCst);
        if !allowed {
            println!("   [ReadOnly] refused {action:?}");
        }
        allowed
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    StoreMonitor::shared().configure(Settings::from_env());

    println!("=== Store Example: Todo App ===\n");

    let read_only = Arc::new(ReadOnlyMode {
        enabled: AtomicBool::new(false),
    });
    if let Err(error) = Directory::shared().register(Arc::clone(&read_only)) {
        eprintln!("depender not registered: {error}");
        return;
    }

    // Everything below mutates stores, so it runs on the main context.
    MainContext::global().run(move || {
        let todos = Todos::shared_store();

        println!("1. Wiring the stats store");
        let stats = Store::new(Stats::default());
        stats.register(|state, action: &Recount| state.set(action.0.clone()));
        if let Err(error) = stats.observe_with_action(&todos, |todos: &Todos| {
            let completed = todos.items.iter().filter(|t| t.completed).count();
            Some(Recount(Stats {
                total: todos.items.len(),
                active: todos.items.len() - completed,
                completed,
            }))
        }) {
            eprintln!("stats not wired: {error}");
            return;
        }
        let _printer = stats.add_observer(|new, _old| {
            println!(
                "   [Stats] Total: {}, Active: {}, Completed: {}",
                new.total, new.active, new.completed
            );
        });
        let _filter = todos.add_field_observer(&field!(Todos, filter), |new, old| {
            println!("   [Filter] {old:?} -> {new:?}");
        });

        println!("\n2. Adding todos");
        todos.send(TodoAction::Add("Learn Rust".to_string()));
        todos.send(TodoAction::Add("Build an app".to_string()));
        todos.send(TodoAction::Add("Write tests".to_string()));

        println!("\n3. Completing a todo");
        todos.send(TodoAction::Toggle(0));

        println!("\n4. Filtering");
        todos.send(SetFilter(TodoFilter::Active));
        for todo in todos.read(|state| state.filtered().into_iter().cloned().collect::<Vec<_>>()) {
            println!("   - [{}] {}", todo.id, todo.title);
        }

        println!("\n5. Read-only mode");
        read_only.enabled.store(true, Ordering::SeqCst);
        todos.send(TodoAction::Add("Ignored".to_string()));
        read_only.enabled.store(false, Ordering::SeqCst);

        let app = AppState::shared_store();
        let attached = app.read(|app| app.sub_state::<Todos>("Todos").map(|t| t.items.len()));
        println!("\n6. AppState sees {attached:?} todos");
        println!("   Final stats: {:?}", stats.get());
    });
}
